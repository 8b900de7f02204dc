//! Settings validation and clamping (spec §4.4 "Numeric semantics", §4.6
//! step 1, §8 boundary behaviors).
//!
//! Clamping and rejection are deliberately different operations: numeric
//! dials that have a UI-meaningful range but no "wrong" value (`sharpening`,
//! `saturation`) are clamped in place; everything else either falls inside
//! its closed range or the whole job is refused with a `ConfigurationError`.

use crate::error::DomainError;
use crate::value_objects::settings::Settings;

const CSS_COLOR_NAMES: &[&str] = &[
    "white", "black", "red", "green", "blue", "yellow", "transparent", "gray", "grey",
];

/// `jpgBackground` is "a color name or hex" per spec §6. Accepts a small
/// fixed set of CSS color keywords or a `#rrggbb`/`#rgb` triplet.
fn is_valid_color(value: &str) -> bool {
    if CSS_COLOR_NAMES.contains(&value.to_ascii_lowercase().as_str()) {
        return true;
    }
    let Some(hex_digits) = value.strip_prefix('#') else {
        return false;
    };
    match hex_digits.len() {
        3 | 6 => hex::decode(pad_short_hex(hex_digits)).is_ok(),
        _ => false,
    }
}

fn pad_short_hex(digits: &str) -> String {
    if digits.len() == 3 {
        digits.chars().flat_map(|c| [c, c]).collect()
    } else {
        digits.to_string()
    }
}

fn aspect_ratio_pattern() -> regex::Regex {
    regex::Regex::new(r"^\d{1,2}:\d{1,2}$").expect("static aspect ratio pattern is valid")
}

/// Validates `settings` in place, clamping `sharpening`/`saturation` to
/// their documented ranges and rejecting anything else out of bounds.
///
/// Called once at `JobRunner::startJob`, before the settings snapshot is
/// taken (spec §4.6 step 1-2).
pub fn validate_settings(settings: &mut Settings) -> Result<(), DomainError> {
    let p = &mut settings.processing;
    p.sharpening = p.sharpening.clamp(0.0, 10.0);
    p.saturation = p.saturation.clamp(0.0, 3.0);

    for (label, quality) in [
        ("jpgQuality", p.jpg_quality),
        ("pngQuality", p.png_quality),
        ("webpQuality", p.webp_quality),
    ] {
        if !(1..=100).contains(&quality) {
            return Err(DomainError::configuration(format!(
                "{label} must be in [1,100], got {quality}"
            )));
        }
    }

    if p.trim_transparent_background && !p.remove_bg {
        return Err(DomainError::configuration(
            "trimTransparentBackground requires removeBg to be enabled",
        ));
    }

    if let Some(background) = &p.jpg_background {
        if !is_valid_color(background) {
            return Err(DomainError::configuration(format!(
                "jpgBackground '{background}' is not a recognized color name or hex triplet"
            )));
        }
    }

    let params = &settings.parameters;
    if !(1..=600).contains(&params.polling_timeout) {
        return Err(DomainError::configuration(format!(
            "pollingTimeout must be in [1,600] seconds, got {}",
            params.polling_timeout
        )));
    }
    if !(1..=1000).contains(&params.count) {
        return Err(DomainError::configuration(format!(
            "count must be in [1,1000], got {}",
            params.count
        )));
    }
    if !(1..=10).contains(&params.variations) {
        return Err(DomainError::configuration(format!(
            "variations must be in [1,10], got {}",
            params.variations
        )));
    }

    let total = params.count as u64 * params.variations as u64;
    if total > 10_000 {
        return Err(DomainError::configuration(format!(
            "count * variations must not exceed 10,000, got {total}"
        )));
    }

    if settings.references_both_providers() {
        return Err(DomainError::configuration(
            "configuration references both piapi and runware credentials; select one provider",
        ));
    }

    let ratio_pattern = aspect_ratio_pattern();
    for ratio in &settings.parameters.aspect_ratios {
        if !ratio_pattern.is_match(ratio) {
            return Err(DomainError::configuration(format!(
                "aspect ratio '{ratio}' must be in W:H form, e.g. '16:9'"
            )));
        }
    }

    Ok(())
}
