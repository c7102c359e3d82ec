// WorkerId — identity of a data-holding party

use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a worker (a party holding a private data partition).
///
/// Cheap to clone: the name lives behind an `Arc<str>`, so tagging every
/// batch with its worker costs a reference-count bump. Ordering and hashing
/// follow the name, which makes `WorkerId` usable as a map key for
/// caller-side state such as per-worker optimizers.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(Arc<str>);

impl WorkerId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The worker's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({:?})", &*self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn equality_and_order() {
        let a = WorkerId::new("alice");
        let b = WorkerId::from("bob");
        assert_eq!(a, WorkerId::from(String::from("alice")));
        assert!(a < b);
        assert_eq!(a.as_str(), "alice");
        assert_eq!(format!("{b}"), "bob");
        assert_eq!(format!("{b:?}"), "WorkerId(\"bob\")");
    }

    #[test]
    fn usable_as_map_key() {
        let mut state: HashMap<WorkerId, usize> = HashMap::new();
        *state.entry(WorkerId::new("alice")).or_default() += 1;
        *state.entry(WorkerId::new("alice")).or_default() += 1;
        assert_eq!(state[&WorkerId::new("alice")], 2);
    }
}
