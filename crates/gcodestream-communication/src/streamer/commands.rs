//! Pass-through command formatting
//!
//! Jog and laser requests bypass the job and go straight to the link, so
//! they are built here from validated parameters.

use gcodestream_core::{JogDirection, LinkError};

/// Axes a jog may move
pub const JOG_AXES: [char; 6] = ['X', 'Y', 'Z', 'A', 'B', 'C'];

/// Build an incremental jog: `$J=G91 G21 X1.000 F1000`
pub fn jog_command(
    axis: &str,
    direction: JogDirection,
    distance: f64,
    feed_rate: f64,
) -> Result<String, LinkError> {
    let mut chars = axis.trim().chars();
    let axis = match (chars.next(), chars.next()) {
        (Some(c), None) if JOG_AXES.contains(&c.to_ascii_uppercase()) => c.to_ascii_uppercase(),
        _ => {
            return Err(LinkError::InvalidCommand {
                reason: format!("unknown jog axis '{}'", axis),
            })
        }
    };

    if !distance.is_finite() || distance <= 0.0 {
        return Err(LinkError::InvalidCommand {
            reason: format!("jog distance must be > 0, got {}", distance),
        });
    }
    if !feed_rate.is_finite() || feed_rate <= 0.0 {
        return Err(LinkError::InvalidCommand {
            reason: format!("jog feed rate must be > 0, got {}", feed_rate),
        });
    }

    Ok(format!(
        "$J=G91 G21 {}{:.3} F{:.0}",
        axis,
        distance * direction.sign(),
        feed_rate
    ))
}
