// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue status snapshots for the `/workers/status` and `/llm/status`
//! endpoints.

use serde::Serialize;

/// Point-in-time view of one queue.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStatus {
    /// Slots currently claimed or running.
    pub running: usize,
    /// Submissions in the waiting list.
    pub waiting: usize,
    /// Worker pool size.
    pub capacity: usize,
    /// True when the waiting list is at capacity.
    pub overloaded: bool,
}

impl QueueStatus {
    /// True when every worker is occupied.
    pub fn is_busy(&self) -> bool {
        self.running >= self.capacity
    }
}

/// Snapshot across all three queues.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerStatus {
    pub speech: QueueStatus,
    pub generate: QueueStatus,
    pub embed: QueueStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_flag_tracks_capacity() {
        let status = QueueStatus {
            running: 1,
            waiting: 0,
            capacity: 1,
            overloaded: false,
        };
        assert!(status.is_busy());
        let idle = QueueStatus {
            running: 0,
            ..status
        };
        assert!(!idle.is_busy());
    }

    #[test]
    fn serialises_snake_case_fields() {
        let status = SchedulerStatus {
            speech: QueueStatus {
                running: 0,
                waiting: 0,
                capacity: 1,
                overloaded: false,
            },
            generate: QueueStatus {
                running: 1,
                waiting: 2,
                capacity: 1,
                overloaded: false,
            },
            embed: QueueStatus {
                running: 0,
                waiting: 0,
                capacity: 1,
                overloaded: false,
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["generate"]["waiting"], 2);
        assert_eq!(json["speech"]["capacity"], 1);
    }
}
