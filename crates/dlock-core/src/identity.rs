//! Owner identity and notification channel naming

use std::fmt::{Display, Formatter};

/// Prefix of every notification channel.
const CHANNEL_PREFIX: &str = "dlock__channel:";

/// Identifier of the currently executing concurrency unit.
///
/// Inside a tokio task this is the task id, elsewhere the OS thread id. The
/// value is stable for the lifetime of the unit, so repeated acquisitions from
/// one task produce the same owner token.
pub fn unit_id() -> String {
    match tokio::task::try_id() {
        Some(id) => format!("task-{}", id),
        None => {
            let thread = format!("{:?}", std::thread::current().id());
            let digits: String = thread.chars().filter(char::is_ascii_digit).collect();
            format!("thread-{}", digits)
        }
    }
}

/// Notification channel for the lock `name`.
///
/// The name is wrapped in a hash tag so the channel hashes to the same cluster
/// slot as the lock key.
pub fn channel_name(name: &str) -> String {
    format!("{}{{{}}}", CHANNEL_PREFIX, name)
}

/// Identifies one holder of a lock record: `{instance_id}:{unit_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    value: String,
    split: usize,
}

impl OwnerToken {
    pub fn new(instance_id: &str, unit_id: &str) -> Self {
        Self {
            value: format!("{}:{}", instance_id, unit_id),
            split: instance_id.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn instance_id(&self) -> &str {
        &self.value[..self.split]
    }

    pub fn unit_id(&self) -> &str {
        &self.value[self.split + 1..]
    }
}

impl Display for OwnerToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name("orders"), "dlock__channel:{orders}");
        assert_eq!(channel_name("orders"), channel_name("orders"));
        assert_ne!(channel_name("orders"), channel_name("order"));
    }

    #[test]
    fn test_owner_token_parts() {
        let token = OwnerToken::new("5f0c-instance", "task-12");
        assert_eq!(token.as_str(), "5f0c-instance:task-12");
        assert_eq!(token.instance_id(), "5f0c-instance");
        assert_eq!(token.unit_id(), "task-12");
        assert_eq!(token.to_string(), "5f0c-instance:task-12");
    }

    #[test]
    fn test_unit_id_outside_task_uses_thread() {
        let id = unit_id();
        assert!(id.starts_with("thread-"), "got {}", id);
        assert_eq!(id, unit_id());
    }

    #[test]
    fn test_unit_id_differs_between_threads() {
        let here = unit_id();
        let there = std::thread::spawn(unit_id).join().unwrap();
        assert_ne!(here, there);
    }

    #[tokio::test]
    async fn test_unit_id_per_task() {
        let a = tokio::spawn(async { (unit_id(), unit_id()) }).await.unwrap();
        let b = tokio::spawn(async { unit_id() }).await.unwrap();

        assert!(a.0.starts_with("task-"));
        assert_eq!(a.0, a.1);
        assert_ne!(a.0, b);
    }

    proptest! {
        #[test]
        fn prop_channel_name_is_injective(a in ".{0,32}", b in ".{0,32}") {
            prop_assume!(a != b);
            prop_assert_ne!(channel_name(&a), channel_name(&b));
        }

        #[test]
        fn prop_owner_token_round_trips_parts(
            instance in "[a-f0-9-]{1,36}",
            unit in "[a-z]+-[0-9]{1,8}",
        ) {
            let token = OwnerToken::new(&instance, &unit);
            prop_assert_eq!(token.instance_id(), instance.as_str());
            prop_assert_eq!(token.unit_id(), unit.as_str());
        }
    }
}
