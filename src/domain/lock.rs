//! Lock state machine
//!
//! A task's lock runs along two independent axes:
//!
//! ```text
//! sign-off:   none -> confirm -> supplier_confirm
//! execution:  none -> started -> completed
//! ```
//!
//! Sign-off locks are set and cleared by hand. Execution locks follow the
//! task status and are never cleared. Nothing here moves a lock backward as a
//! side effect; cascades only read locks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::task::TaskStatus;

/// Lock classification of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    #[default]
    None,
    Confirm,
    SupplierConfirm,
    Started,
    Completed,
}

impl LockType {
    /// Returns true for every lock other than `none`
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockType::None)
    }

    /// Lock strength, lower is stronger; `None` for unlocked tasks
    pub fn priority(&self) -> Option<u8> {
        match self {
            LockType::SupplierConfirm => Some(1),
            LockType::Confirm => Some(2),
            LockType::Started => Some(3),
            LockType::Completed => Some(4),
            LockType::None => None,
        }
    }

    /// Returns true if the lock may be cleared by hand
    pub fn is_unlockable(&self) -> bool {
        matches!(self, LockType::Confirm | LockType::SupplierConfirm)
    }

    /// Returns true if the lock prevents the given edit
    pub fn forbids(&self, edit: TaskEdit) -> bool {
        match edit {
            TaskEdit::Delete | TaskEdit::Dependencies => self.is_locked(),
            TaskEdit::Rename | TaskEdit::Hold => matches!(self, LockType::Completed),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::None => "none",
            LockType::Confirm => "confirm",
            LockType::SupplierConfirm => "supplier_confirm",
            LockType::Started => "started",
            LockType::Completed => "completed",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(LockType::None),
            "confirm" => Ok(LockType::Confirm),
            "supplier_confirm" => Ok(LockType::SupplierConfirm),
            "started" => Ok(LockType::Started),
            "completed" => Ok(LockType::Completed),
            other => Err(format!("unknown lock type '{}'", other)),
        }
    }
}

/// Edits gated by a task's lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEdit {
    Rename,
    Hold,
    Delete,
    Dependencies,
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("cannot {action} a task locked as {lock}")]
    WrongLock {
        action: &'static str,
        lock: LockType,
    },

    #[error("cannot {action} a task whose status is {status}")]
    WrongStatus {
        action: &'static str,
        status: TaskStatus,
    },

    #[error("{0} locks cannot be cleared")]
    NotUnlockable(LockType),
}

/// A requested change of lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTransition {
    /// `none -> confirm`
    Confirm,
    /// `confirm -> supplier_confirm`
    SupplierConfirm,
    /// `* -> started`, with status `started`
    Start,
    /// `started -> completed`, with status `completed`
    Complete,
    /// `confirm | supplier_confirm -> none`
    Unlock,
}

impl LockTransition {
    fn action(&self) -> &'static str {
        match self {
            LockTransition::Confirm => "confirm",
            LockTransition::SupplierConfirm => "supplier-confirm",
            LockTransition::Start => "start",
            LockTransition::Complete => "complete",
            LockTransition::Unlock => "unlock",
        }
    }

    /// Computes the lock and status after this transition
    pub fn apply(
        self,
        lock: LockType,
        status: TaskStatus,
    ) -> Result<(LockType, TaskStatus), TransitionError> {
        let action = self.action();
        let wrong_lock = || TransitionError::WrongLock { action, lock };

        match self {
            LockTransition::Confirm => match lock {
                LockType::None => Ok((LockType::Confirm, status)),
                _ => Err(wrong_lock()),
            },
            LockTransition::SupplierConfirm => match lock {
                LockType::Confirm => Ok((LockType::SupplierConfirm, status)),
                _ => Err(wrong_lock()),
            },
            LockTransition::Start => {
                if matches!(lock, LockType::Started | LockType::Completed) {
                    return Err(wrong_lock());
                }
                if status != TaskStatus::NotStarted {
                    return Err(TransitionError::WrongStatus { action, status });
                }
                Ok((LockType::Started, TaskStatus::Started))
            }
            LockTransition::Complete => {
                if lock != LockType::Started {
                    return Err(wrong_lock());
                }
                if status != TaskStatus::Started {
                    return Err(TransitionError::WrongStatus { action, status });
                }
                Ok((LockType::Completed, TaskStatus::Completed))
            }
            LockTransition::Unlock => {
                if lock.is_unlockable() {
                    Ok((LockType::None, status))
                } else if lock.is_locked() {
                    Err(TransitionError::NotUnlockable(lock))
                } else {
                    Err(wrong_lock())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_off_axis() {
        let (lock, status) = LockTransition::Confirm
            .apply(LockType::None, TaskStatus::NotStarted)
            .unwrap();
        assert_eq!(lock, LockType::Confirm);
        assert_eq!(status, TaskStatus::NotStarted);

        let (lock, _) = LockTransition::SupplierConfirm
            .apply(lock, status)
            .unwrap();
        assert_eq!(lock, LockType::SupplierConfirm);
    }

    #[test]
    fn supplier_confirm_requires_confirm() {
        let result = LockTransition::SupplierConfirm.apply(LockType::None, TaskStatus::NotStarted);
        assert!(matches!(result, Err(TransitionError::WrongLock { .. })));
    }

    #[test]
    fn confirm_requires_unlocked() {
        let result = LockTransition::Confirm.apply(LockType::Started, TaskStatus::Started);
        assert!(result.is_err());
    }

    #[test]
    fn start_moves_status_with_lock() {
        let (lock, status) = LockTransition::Start
            .apply(LockType::SupplierConfirm, TaskStatus::NotStarted)
            .unwrap();
        assert_eq!(lock, LockType::Started);
        assert_eq!(status, TaskStatus::Started);
    }

    #[test]
    fn held_task_cannot_start() {
        let result = LockTransition::Start.apply(LockType::None, TaskStatus::OnHold);
        assert!(matches!(result, Err(TransitionError::WrongStatus { .. })));
    }

    #[test]
    fn complete_only_from_started() {
        assert!(LockTransition::Complete
            .apply(LockType::None, TaskStatus::NotStarted)
            .is_err());

        let (lock, status) = LockTransition::Complete
            .apply(LockType::Started, TaskStatus::Started)
            .unwrap();
        assert_eq!(lock, LockType::Completed);
        assert_eq!(status, TaskStatus::Completed);
    }

    #[test]
    fn execution_locks_never_go_back() {
        assert!(LockTransition::Start
            .apply(LockType::Completed, TaskStatus::Completed)
            .is_err());
        assert_eq!(
            LockTransition::Unlock.apply(LockType::Started, TaskStatus::Started),
            Err(TransitionError::NotUnlockable(LockType::Started))
        );
        assert_eq!(
            LockTransition::Unlock.apply(LockType::Completed, TaskStatus::Completed),
            Err(TransitionError::NotUnlockable(LockType::Completed))
        );
    }

    #[test]
    fn unlock_clears_sign_off() {
        let (lock, status) = LockTransition::Unlock
            .apply(LockType::SupplierConfirm, TaskStatus::OnHold)
            .unwrap();
        assert_eq!(lock, LockType::None);
        assert_eq!(status, TaskStatus::OnHold);
    }

    #[test]
    fn edit_policy() {
        assert!(LockType::Confirm.forbids(TaskEdit::Delete));
        assert!(LockType::Confirm.forbids(TaskEdit::Dependencies));
        assert!(!LockType::Confirm.forbids(TaskEdit::Rename));
        assert!(!LockType::Started.forbids(TaskEdit::Hold));
        assert!(LockType::Completed.forbids(TaskEdit::Rename));
        assert!(!LockType::None.forbids(TaskEdit::Delete));
    }

    #[test]
    fn priority_orders_supplier_confirm_first() {
        assert!(LockType::SupplierConfirm.priority() < LockType::Confirm.priority());
        assert_eq!(LockType::None.priority(), None);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!("started".parse::<LockType>().unwrap(), LockType::Started);
        assert!("manually_positioned".parse::<LockType>().is_err());
    }
}
