//! Identifier generation for constraints.

use uuid::Uuid;

/// Source of fresh constraint ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random (v4) UUIDs in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{IdGenerator, UuidGenerator};
    use uuid::Uuid;

    #[test]
    fn uuid_generator_yields_distinct_parseable_ids() {
        let first = UuidGenerator.next_id();
        let second = UuidGenerator.next_id();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
