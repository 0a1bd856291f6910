//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (mark range, queue size, probe intervals)
//! - Detect duplicate vserver names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A semantic problem in an otherwise well-formed config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("coordinator.mark_size must be greater than zero")]
    EmptyMarkRange,

    #[error("mark range {base} + {size} overflows u32")]
    MarkRangeOverflow { base: u32, size: u32 },

    #[error("coordinator.queue_size must be greater than zero")]
    EmptyQueue,

    #[error("vserver #{0} has an empty name")]
    UnnamedVserver(usize),

    #[error("vserver {0:?} is defined more than once")]
    DuplicateVserver(String),

    #[error("healthcheck {check:?} on vserver {vserver:?} has a zero {field}")]
    ZeroDuration {
        vserver: String,
        check: String,
        field: &'static str,
    },
}

/// Checks a parsed config, collecting every problem found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let coordinator = &config.coordinator;
    if coordinator.mark_size == 0 {
        errors.push(ValidationError::EmptyMarkRange);
    }
    if coordinator.mark_base.checked_add(coordinator.mark_size).is_none() {
        errors.push(ValidationError::MarkRangeOverflow {
            base: coordinator.mark_base,
            size: coordinator.mark_size,
        });
    }
    if coordinator.queue_size == 0 {
        errors.push(ValidationError::EmptyQueue);
    }

    let mut names = HashSet::new();
    for (i, vserver) in config.vservers.iter().enumerate() {
        if vserver.name.is_empty() {
            errors.push(ValidationError::UnnamedVserver(i));
        } else if !names.insert(vserver.name.as_str()) {
            errors.push(ValidationError::DuplicateVserver(vserver.name.clone()));
        }

        for hc in &vserver.healthchecks {
            for (field, value) in [("interval", hc.interval_ms), ("timeout", hc.timeout_ms)] {
                if value == 0 {
                    errors.push(ValidationError::ZeroDuration {
                        vserver: vserver.name.clone(),
                        check: hc.name.clone(),
                        field,
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
