//! # Validation Module
//!
//! Input validation for task fields.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: TaskService (tasksync-sync)                                  │
//! │  └── THIS MODULE: rejects bad input before any durable write           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Remote boundary (tasksync-sync::protocol)                    │
//! │  └── Same rules applied to server payloads; invalid records skipped    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── PRIMARY KEY on task id                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MAX_TITLE_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a task title and returns it trimmed.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most [`MAX_TITLE_LENGTH`] characters (not bytes)
///
/// ## Example
/// ```rust
/// use tasksync_core::validation::validate_title;
///
/// assert_eq!(validate_title("  Buy milk  ").unwrap(), "Buy milk");
/// assert!(validate_title("   ").is_err());
/// assert!(validate_title(&"a".repeat(101)).is_err());
/// ```
pub fn validate_title(title: &str) -> ValidationResult<String> {
    let title = title.trim();

    if title.is_empty() {
        return Err(ValidationError::Required {
            field: "title".to_string(),
        });
    }

    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LENGTH,
        });
    }

    Ok(title.to_string())
}

/// Validates a task id supplied by a caller or a server.
pub fn validate_task_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("Buy milk").unwrap(), "Buy milk");
        assert_eq!(validate_title("\tpad\n").unwrap(), "pad");

        assert!(validate_title("").is_err());
        assert!(validate_title("    ").is_err());
        assert!(validate_title(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_title_length_counts_characters() {
        // 100 multi-byte characters is still within the limit
        let title = "é".repeat(100);
        assert!(validate_title(&title).is_ok());

        let err = validate_title(&"é".repeat(101)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                field: "title".to_string(),
                max: 100
            }
        );
    }

    #[test]
    fn test_validate_task_id() {
        assert!(validate_task_id("42").is_ok());
        assert!(validate_task_id("").is_err());
        assert!(validate_task_id("  ").is_err());
    }
}
