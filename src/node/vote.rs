//! Vote service
//!
//! Votes are the quorum primitive of the write path. The default policy grants
//! every request: a yes vote proves only that the voter was reachable and
//! online when asked, not that it is ready to store anything. Write safety
//! therefore rests on "a majority of nodes answered", nothing stronger.

use crate::common::Decision;

/// Decides whether this node agrees to a proposed write.
pub trait VotePolicy: Send + Sync {
    fn decide(&self, filename: &str) -> Decision;
}

/// Grants every vote.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl VotePolicy for AcceptAll {
    fn decide(&self, _filename: &str) -> Decision {
        Decision::Yes
    }
}

impl<F> VotePolicy for F
where
    F: Fn(&str) -> Decision + Send + Sync,
{
    fn decide(&self, filename: &str) -> Decision {
        self(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all() {
        assert_eq!(AcceptAll.decide("file1.txt"), Decision::Yes);
        assert_eq!(AcceptAll.decide("never-assigned.txt"), Decision::Yes);
    }

    #[test]
    fn test_closure_policy() {
        let policy = |filename: &str| {
            if filename.ends_with(".lock") {
                Decision::No
            } else {
                Decision::Yes
            }
        };
        assert_eq!(policy.decide("file1.txt"), Decision::Yes);
        assert_eq!(policy.decide("file1.lock"), Decision::No);
    }
}
