//! This module is an integration test for the batch driver, checking that
//! protocols are isolated from one another and that output is repeatable.
#![cfg(test)]

use std::fs;

use storage_invariant_engine::{
    batch::{self, Outcome},
    constant::BEFORE_STATE_FILE_NAME,
    engine,
    InvariantDocument,
};

mod common;

#[test]
fn broken_protocol_does_not_affect_siblings() -> anyhow::Result<()> {
    let inputs = tempfile::tempdir()?;
    let outputs = tempfile::tempdir()?;
    common::copy_protocol("simple_token", inputs.path())?;
    let broken = common::copy_protocol("yield_vault", inputs.path())?;
    fs::remove_file(broken.join(BEFORE_STATE_FILE_NAME))?;

    let dirs = batch::discover(inputs.path())?;
    assert_eq!(dirs.len(), 2);

    let config = batch::Config::new(outputs.path()).with_threads(2);
    let summary = batch::run(&dirs, &config, &engine::Config::default())?;

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(matches!(summary.outcomes["yield_vault"], Outcome::Failure { .. }));

    let Outcome::Success { invariants, output } = &summary.outcomes["simple_token"] else {
        anyhow::bail!("simple_token should have succeeded");
    };
    assert_eq!(*invariants, 1);
    let document = InvariantDocument::from_json_str(&fs::read_to_string(output)?)?;
    assert_eq!(document.invariants[0].id, "TEMPLATE_supply_stability_001");
    assert!(!config.output_path("yield_vault").exists());
    Ok(())
}

#[test]
fn malformed_json_is_a_failure() -> anyhow::Result<()> {
    let inputs = tempfile::tempdir()?;
    let outputs = tempfile::tempdir()?;
    let protocol = common::copy_protocol("simple_token", inputs.path())?;
    fs::write(protocol.join(BEFORE_STATE_FILE_NAME), "{ not json")?;

    let config = batch::Config::new(outputs.path()).with_threads(1);
    let summary = batch::run(&[protocol], &config, &engine::Config::default())?;

    let Outcome::Failure { reason } = &summary.outcomes["simple_token"] else {
        anyhow::bail!("simple_token should have failed");
    };
    assert!(reason.contains(BEFORE_STATE_FILE_NAME));
    Ok(())
}

#[test]
fn output_is_repeatable() -> anyhow::Result<()> {
    let inputs = tempfile::tempdir()?;
    common::copy_protocol("simple_token", inputs.path())?;
    common::copy_protocol("yield_vault", inputs.path())?;
    let dirs = batch::discover(inputs.path())?;

    let mut runs = vec![];
    for threads in [1, 4] {
        let outputs = tempfile::tempdir()?;
        let config = batch::Config::new(outputs.path()).with_threads(threads);
        let summary = batch::run(&dirs, &config, &engine::Config::default())?;
        assert_eq!(summary.succeeded(), 2);

        let texts = ["simple_token", "yield_vault"]
            .iter()
            .map(|name| fs::read_to_string(config.output_path(name)))
            .collect::<Result<Vec<_>, _>>()?;
        runs.push(texts);
    }

    assert_eq!(runs[0], runs[1]);
    Ok(())
}
