//! Parsing of the trainer's line-oriented progress protocol.

use nt_types::MetricRecord;

/// Parse one stdout line against the fixed progress shape
/// `Epoch <i>/<total> (<n> samples) - Loss: <f> - Accuracy: <f>% - LR: <f>`.
///
/// Returns `None` for every line that does not match; the trainer emits
/// other diagnostics on the same stream and they are not errors.
pub fn parse_progress_line(line: &str) -> Option<MetricRecord> {
    let rest = line.trim().strip_prefix("Epoch ")?;

    let (header, rest) = rest.split_once(" - Loss: ")?;
    let (step, header) = header.split_once('/')?;
    let (total, samples) = header.split_once(" (")?;
    let samples = samples.strip_suffix(" samples)")?;

    let step: u64 = step.parse().ok()?;
    let _total: u64 = total.parse().ok()?;
    let _samples: u64 = samples.parse().ok()?;

    let (loss, rest) = rest.split_once(" - Accuracy: ")?;
    let (accuracy, rest) = rest.split_once("% - LR: ")?;

    Some(MetricRecord {
        step,
        loss: loss.parse().ok()?,
        accuracy: accuracy.parse().ok()?,
        learning_rate: rest.split_whitespace().next()?.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_canonical_line() {
        let record = parse_progress_line(
            "Epoch 3/100 (1600 samples) - Loss: 0.4523 - Accuracy: 87.65% - LR: 1.00e-03",
        )
        .unwrap();

        assert_eq!(record.step, 3);
        assert_eq!(record.loss, 0.4523);
        assert_eq!(record.accuracy, 87.65);
        assert_eq!(record.learning_rate, 0.001);
    }

    #[test]
    fn line_missing_accuracy_yields_nothing() {
        assert!(parse_progress_line(
            "Epoch 3/100 (1600 samples) - Loss: 0.4523 - LR: 1.00e-03"
        )
        .is_none());
    }

    #[test]
    fn diagnostic_lines_are_ignored() {
        for line in [
            "",
            "loading training data from examples/training_positions.txt",
            "Epoch summary follows",
            "Epoch x/100 (1600 samples) - Loss: 0.1 - Accuracy: 50.00% - LR: 0.01",
            "Epoch 3/100 1600 samples - Loss: 0.1 - Accuracy: 50.00% - LR: 0.01",
            "Epoch 3/100 (1600 samples) - Loss: nope - Accuracy: 50.00% - LR: 0.01",
        ] {
            assert!(parse_progress_line(line).is_none(), "accepted: {line:?}");
        }
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        let record = parse_progress_line(
            "  Epoch 1/10 (320 samples) - Loss: 1.2000 - Accuracy: 12.50% - LR: 5.00e-02\n",
        )
        .unwrap();
        assert_eq!(record.step, 1);
        assert_eq!(record.accuracy, 12.5);
    }

    #[test]
    fn scientific_notation_learning_rate() {
        let record = parse_progress_line(
            "Epoch 99/100 (4096 samples) - Loss: 0.0100 - Accuracy: 99.10% - LR: 2.50e-05",
        )
        .unwrap();
        assert!((record.learning_rate - 2.5e-5).abs() < 1e-12);
    }
}
