//! Observable indicators published to the host UI.

use serde::{Deserialize, Serialize};

use crate::candidates::Candidate;
use crate::state::{InputLock, SessionState};

/// Broadcast channel capacity for notices.
pub const NOTICE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiceNotice {
    StatusChanged { state: SessionState },
    InputLockChanged { lock: InputLock },
    CandidatesShown { candidates: Vec<Candidate> },
    CandidatesCleared,
    /// A message the user should see.
    Failure { message: String },
}
