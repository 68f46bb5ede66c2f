//! Plain elimination: the last team with anyone standing wins.

use super::ModePolicy;

/// Players are knocked out by void falls or by the host; the round ends
/// when at most one team is left.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastStanding;

impl ModePolicy for LastStanding {
    fn name(&self) -> &str {
        "elimination"
    }
}
