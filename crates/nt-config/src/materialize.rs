//! Renders a sampled assignment into the trainer's configuration format.

use nt_types::{Assignment, ConfigError};
use tracing::debug;

use crate::document::ConfigDocument;

pub const SECTION_HYPERPARAMETERS: &str = "hyperparameters";
pub const SECTION_LR_SCHEDULER: &str = "lr_scheduler";
pub const SECTION_ARCHITECTURE: &str = "architecture";

/// Keys overwritten from the assignment, when present. Everything else in
/// the template is left untouched.
const HYPERPARAMETER_KEYS: &[&str] = &[
    "learning_rate",
    "batch_size",
    "dropout",
    "epochs",
    "samples_per_epoch",
];
const SCHEDULER_KEYS: &[&str] = &["decay_rate", "decay_steps", "min_lr"];

/// The trainer rejects configs missing any of these sections; catch that
/// before any subprocess runs.
pub fn validate_template(template: &ConfigDocument) -> Result<(), ConfigError> {
    for section in [
        SECTION_HYPERPARAMETERS,
        SECTION_LR_SCHEDULER,
        SECTION_ARCHITECTURE,
    ] {
        if !template.has_section(section) {
            return Err(ConfigError::MissingSection(section.to_string()));
        }
    }
    Ok(())
}

/// Pure function from (template, assignment) to a trial configuration:
/// tuned keys present in the assignment overwrite the template's values,
/// untouched settings are preserved.
pub fn materialize(
    template: &ConfigDocument,
    assignment: &Assignment,
) -> Result<ConfigDocument, ConfigError> {
    let mut doc = template.clone();

    for key in HYPERPARAMETER_KEYS {
        if let Some(value) = assignment.get(key) {
            doc.set(SECTION_HYPERPARAMETERS, key, value.to_string())?;
        }
    }

    // The scheduler type is implied by tuning its decay: the space only
    // samples exponential-decay settings.
    if assignment.contains("decay_rate") {
        doc.set(SECTION_LR_SCHEDULER, "type", "exponential")?;
    }
    for key in SCHEDULER_KEYS {
        if let Some(value) = assignment.get(key) {
            doc.set(SECTION_LR_SCHEDULER, key, value.to_string())?;
        }
    }

    if let Some(n_layers) = assignment.get_int("n_hidden_layers") {
        let widths: Vec<String> = (0..n_layers)
            .filter_map(|i| assignment.get_int(&format!("hidden_width_{i}")))
            .map(|w| w.to_string())
            .collect();
        doc.set(SECTION_ARCHITECTURE, "hidden_layers", n_layers.to_string())?;
        doc.set(SECTION_ARCHITECTURE, "hidden_sizes", widths.join(","))?;
    }

    debug!(parameters = assignment.len(), "materialized trial configuration");
    Ok(doc)
}
