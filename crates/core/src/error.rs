use thiserror::Error;

use crate::model::{ParseIdError, SetError};

/// Umbrella error for domain-level failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Set(#[from] SetError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlashcardSet, SetId};
    use crate::time::fixed_now;

    fn parse_and_build(raw_id: &str, title: &str) -> Result<FlashcardSet, Error> {
        let id: SetId = raw_id.parse()?;
        Ok(FlashcardSet::new(id, title, None, fixed_now())?)
    }

    #[test]
    fn domain_failures_convert_into_umbrella_error() {
        assert!(matches!(parse_and_build("  ", "Verbs"), Err(Error::ParseId(_))));
        assert!(matches!(parse_and_build("s1", " "), Err(Error::Set(SetError::EmptyTitle))));
        assert!(parse_and_build("s1", "Verbs").is_ok());
    }
}
