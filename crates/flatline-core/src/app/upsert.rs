//! Idempotent upsert shared by every versioned definition.
//!
//! Create first; if the remote side reports a conflict, mint a new version
//! instead. Never an in-place update, so history stays auditable. Two racing
//! runs may both mint a version, which is harmless.

use std::future::Future;

/// Which branch produced the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted<T> {
    /// First registration under this id.
    Created(T),
    /// The id existed; a new version was minted.
    Versioned(T),
}

impl<T> Upserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upserted::Created(v) | Upserted::Versioned(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

/// Run `create`; on an error matching `is_conflict`, run `new_version`.
///
/// Any other error from `create`, and any error from `new_version`, is
/// returned as is.
pub async fn idempotent_upsert<T, E, C, CF, V, VF, P>(
    create: C,
    new_version: V,
    is_conflict: P,
) -> Result<Upserted<T>, E>
where
    C: FnOnce() -> CF,
    CF: Future<Output = Result<T, E>>,
    V: FnOnce() -> VF,
    VF: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    match create().await {
        Ok(value) => Ok(Upserted::Created(value)),
        Err(err) if is_conflict(&err) => new_version().await.map(Upserted::Versioned),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum Fake {
        Conflict,
        Boom,
    }

    #[tokio::test]
    async fn create_success_skips_versioning() {
        let versioned = Cell::new(false);
        let out = idempotent_upsert(
            || async { Ok::<_, Fake>(1) },
            || async {
                versioned.set(true);
                Ok(2)
            },
            |e| *e == Fake::Conflict,
        )
        .await
        .unwrap();

        assert_eq!(out, Upserted::Created(1));
        assert!(!versioned.get());
    }

    #[tokio::test]
    async fn conflict_falls_back_to_new_version() {
        let out = idempotent_upsert(
            || async { Err::<u32, _>(Fake::Conflict) },
            || async { Ok(2) },
            |e| *e == Fake::Conflict,
        )
        .await
        .unwrap();

        assert_eq!(out, Upserted::Versioned(2));
        assert!(!out.was_created());
        assert_eq!(out.into_inner(), 2);
    }

    #[tokio::test]
    async fn other_errors_pass_through() {
        let versioned = Cell::new(false);
        let err = idempotent_upsert(
            || async { Err::<u32, _>(Fake::Boom) },
            || async {
                versioned.set(true);
                Ok(2)
            },
            |e| *e == Fake::Conflict,
        )
        .await
        .unwrap_err();

        assert_eq!(err, Fake::Boom);
        assert!(!versioned.get());
    }

    #[tokio::test]
    async fn version_errors_are_not_swallowed() {
        let err = idempotent_upsert(
            || async { Err::<u32, _>(Fake::Conflict) },
            || async { Err(Fake::Boom) },
            |e| *e == Fake::Conflict,
        )
        .await
        .unwrap_err();

        assert_eq!(err, Fake::Boom);
    }
}
