//! Receiving discovered heads.

use crate::revision::{Head, Revision};

/// Receives `(head, revision)` pairs as a scan discovers them.
///
/// Emission order is branches first, then pull requests, each in the order
/// GitHub enumerates them.
pub trait HeadObserver: Send {
    /// Called once per discovered head.
    fn observe(&mut self, head: Head, revision: Revision);

    /// Returning `false` ends the scan early. The scan still completes
    /// successfully with what was observed so far.
    fn is_observing(&self) -> bool {
        true
    }
}

/// Collects every observation in emission order.
#[derive(Debug, Default, Clone)]
pub struct Collector {
    observed: Vec<(Head, Revision)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything observed, in emission order.
    pub fn result(&self) -> &[(Head, Revision)] {
        &self.observed
    }

    pub fn into_result(self) -> Vec<(Head, Revision)> {
        self.observed
    }

    /// Names of the observed heads, in emission order.
    pub fn names(&self) -> Vec<&str> {
        self.observed.iter().map(|(head, _)| head.name()).collect()
    }

    /// Looks up an observation by head name.
    pub fn get(&self, name: &str) -> Option<&(Head, Revision)> {
        self.observed.iter().find(|(head, _)| head.name() == name)
    }
}

impl HeadObserver for Collector {
    fn observe(&mut self, head: Head, revision: Revision) {
        self.observed.push((head, revision));
    }
}

/// Stops after a fixed number of observations.
#[derive(Debug, Clone)]
pub struct Limited<O> {
    inner: O,
    remaining: usize,
}

impl<O: HeadObserver> Limited<O> {
    pub fn new(inner: O, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: HeadObserver> HeadObserver for Limited<O> {
    fn observe(&mut self, head: Head, revision: Revision) {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.inner.observe(head, revision);
        }
    }

    fn is_observing(&self) -> bool {
        self.remaining > 0 && self.inner.is_observing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::BranchName;
    use crate::revision::{BranchHead, BranchRevision};
    use crate::testing::sha;

    fn branch(name: &str) -> (Head, Revision) {
        let head = BranchHead::new(BranchName::new(name).unwrap());
        let revision = BranchRevision::new(head.clone(), sha("abc")).into();
        (Head::Branch(head), revision)
    }

    #[test]
    fn collector_keeps_emission_order() {
        let mut collector = Collector::new();
        for name in ["master", "feature", "PR-1"] {
            let (head, revision) = branch(name);
            collector.observe(head, revision);
        }
        assert_eq!(collector.names(), vec!["master", "feature", "PR-1"]);
        assert!(collector.get("feature").is_some());
        assert!(collector.get("missing").is_none());
    }

    #[test]
    fn limited_stops_observing_at_the_limit() {
        let mut limited = Limited::new(Collector::new(), 1);
        assert!(limited.is_observing());
        let (head, revision) = branch("master");
        limited.observe(head, revision);
        assert!(!limited.is_observing());
        let (head, revision) = branch("feature");
        limited.observe(head, revision);
        assert_eq!(limited.into_inner().names(), vec!["master"]);
    }
}
