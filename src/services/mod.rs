// src/services/mod.rs

//! Transactional operations over the store. Each public function is one
//! engine operation; the acting user is always an explicit argument.

pub mod attempts;
pub mod catalog;
pub mod integrity;
pub mod leaderboard;
pub mod ledger;

/// Who is asking to read an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: i64,
    /// Instructors and admins may read any learner's attempts.
    pub is_staff: bool,
}

impl Requester {
    pub fn can_view(&self, owner_id: i64) -> bool {
        self.is_staff || self.user_id == owner_id
    }
}
