use crate::error::Error;

/// How a work item finished, before normalization.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The synchronous part returned a plain value.
    Returned(T),
    /// The synchronous part returned an error or panicked, or its future panicked.
    Threw(Error),
    /// The completion handle or the returned future settled.
    Completed(Result<T, Error>),
}

impl<T> Outcome<T> {
    /// Normalize to a single `(error, result)` shape.
    pub fn settle(self) -> Result<T, Error> {
        match self {
            Self::Returned(value) => Ok(value),
            Self::Threw(error) => Err(error),
            Self::Completed(result) => result,
        }
    }
}

/// One entry of a batch result.
///
/// Without settle mode a failing work item never reaches a slot, the iterator hands the error to
/// the driver instead. In settle mode the error is stored here and the batch keeps going.
#[derive(Debug, Clone)]
pub enum Slot<T> {
    Value(T),
    Error(Error),
}

impl<T> Slot<T> {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Value(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, Error>> for Slot<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_normalizes_every_variant() {
        assert_eq!(Outcome::Returned(1).settle().unwrap(), 1);
        assert_eq!(Outcome::Completed(Ok(3)).settle().unwrap(), 3);

        let err = Outcome::<i32>::Threw(Error::msg("two err")).settle().unwrap_err();
        assert_eq!(err.to_string(), "two err");

        let err = Outcome::<i32>::Completed(Err(Error::Abandoned))
            .settle()
            .unwrap_err();
        assert!(matches!(err, Error::Abandoned));
    }

    #[test]
    fn slot_accessors() {
        let value = Slot::Value(1);
        let error: Slot<i32> = Slot::from(Err(Error::msg("oh no")));

        assert!(!value.is_error());
        assert_eq!(value.value(), Some(&1));
        assert!(value.error().is_none());

        assert!(error.is_error());
        assert_eq!(error.value(), None);
        assert_eq!(error.error().unwrap().to_string(), "oh no");
        assert_eq!(error.into_result().unwrap_err().to_string(), "oh no");
    }
}
