//! Error wrappers used when many independent units of work can fail, such as
//! the protocols of a batch run.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// An error tagged with the name of the unit of work that produced it.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The unit name, usually a protocol directory name.
    pub location: String,

    pub payload: E,
}

impl<E> Display for Located<E>
where
    E: Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.location, self.payload)
    }
}

/// Tags the error side of a value with a unit name.
pub trait Locatable
where
    Self: Sized,
{
    type Located;

    /// Tags the error with the name of `unit`.
    fn locate(self, unit: impl Into<String>) -> Self::Located;
}

impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, unit: impl Into<String>) -> Self::Located {
        self.map_err(|payload| Located {
            location: unit.into(),
            payload,
        })
    }
}

/// Every error collected over a run. Insertion order is kept unless the
/// errors carry a unit name.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Errors<E> {
    payloads: Vec<E>,
}

impl<E> Errors<E> {
    #[must_use]
    pub fn new() -> Self {
        Self { payloads: vec![] }
    }

    /// Gets the collected errors.
    #[must_use]
    pub fn payloads(&self) -> &[E] {
        &self.payloads
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl<E> Errors<E>
where
    E: std::error::Error,
{
    /// Appends `error`.
    pub fn add(&mut self, error: E) {
        self.payloads.push(error);
    }
}

impl<E> Errors<Located<E>>
where
    E: std::error::Error + Clone,
{
    /// Records `payload` against `unit`. Errors stay ordered by unit name so
    /// that batch summaries do not depend on which worker finished first.
    pub fn add_located(&mut self, unit: impl Into<String>, payload: E) {
        self.payloads.push(Located {
            location: unit.into(),
            payload,
        });
        self.payloads.sort_by(|l, r| l.location.cmp(&r.location));
    }
}

impl<E> Default for Errors<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<E> for Errors<E>
where
    E: std::error::Error,
{
    fn from(value: E) -> Self {
        Self {
            payloads: vec![value],
        }
    }
}

impl<E> From<Errors<E>> for Vec<E>
where
    E: std::error::Error,
{
    fn from(value: Errors<E>) -> Self {
        value.payloads
    }
}

/// Writes a count line followed by one error per line.
impl<E> Display for Errors<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.payloads.is_empty() {
            return write!(f, "Encountered no errors");
        }
        writeln!(f, "Encountered {} errors:", self.payloads.len())?;
        self.payloads.iter().try_for_each(|error| writeln!(f, "{error}"))
    }
}

#[cfg(test)]
mod test {
    use crate::error::{container::Locatable, Error, Errors};

    #[test]
    fn located_errors_stay_sorted_by_unit() {
        let mut errors = Errors::new();
        errors.add_located("zeta", Error::other("late"));
        errors.add_located("alpha", Error::other("early"));

        let names: Vec<_> = errors.payloads().iter().map(|e| e.location.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(
            errors.to_string(),
            "Encountered 2 errors:\n[alpha]: Unknown Error: \"early\"\n[zeta]: Unknown Error: \"late\"\n"
        );
    }

    #[test]
    fn results_can_be_located() {
        let result: Result<(), Error> = Err(Error::WorkerPool("no threads".into()));
        let located = result.locate("euler").unwrap_err();
        assert_eq!(located.location, "euler");
        assert_eq!(located.to_string(), "[euler]: Could not build worker pool: no threads");
    }
}
