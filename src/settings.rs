//! Breakpoint settings derivation
//!
//! Turns a photo's loose display intents (aspect ratios, screen sizes, viewport
//! ratios, retina flag) into one upload setting per aspect-ratio variant.

use crate::markup::AspectRatio;
use crate::models::{DerivedSetting, PhotoRequest, Transformation, ORIGINAL_RATIO};
use crate::Result;
use serde_json::Value;

const DEFAULT_VIEW_PORT_RATIO: u32 = 100;

/// Parse a leading integer the way lenient form inputs are read: optional
/// leading whitespace and sign, then digits. Trailing junk is ignored
/// (`"50%"` is 50); no digits at all yields `None`.
pub fn parse_int_prefix(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits: &str = &rest[..rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len())];
    if digits.is_empty() {
        return None;
    }

    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Integer from a loosely typed JSON value: numbers are truncated, strings go
/// through [`parse_int_prefix`], everything else is `None`.
pub fn parse_loose_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int_prefix(s),
        _ => None,
    }
}

fn view_port_ratio(photo: &PhotoRequest, index: usize) -> u32 {
    let parsed = photo
        .view_port_ratios
        .as_ref()
        .and_then(|ratios| ratios.get(index))
        .and_then(parse_loose_int);

    match parsed {
        Some(ratio) if ratio > 0 => u32::try_from(ratio).unwrap_or(u32::MAX),
        _ => DEFAULT_VIEW_PORT_RATIO,
    }
}

/// Screen widths from a `"min,max"` entry, scaled by the viewport ratio and
/// rounded up. Missing or non-numeric components are 0.
fn screen_bounds(entry: &str, view_port_ratio: u32) -> (i64, i64) {
    let scale = |part: Option<&str>| -> i64 {
        let raw = part.and_then(parse_int_prefix).unwrap_or(0);
        (raw as f64 * (view_port_ratio as f64 / 100.0)).ceil() as i64
    };

    let mut parts = entry.split(',');
    let min = scale(parts.next());
    let max = scale(parts.next());
    (min, max)
}

/// Explicit transformation wins; `"original"` gets no crop; any other ratio is
/// fill-cropped to that ratio.
fn transformation_for(photo: &PhotoRequest, ratio: &str) -> Transformation {
    match &photo.transformation {
        Some(explicit) => explicit.clone(),
        None if ratio == ORIGINAL_RATIO => Transformation::default(),
        None => Transformation::fill(ratio),
    }
}

/// Derive the setting for the aspect ratio at `index` in `photo.aspect_ratios`.
pub fn derive_settings(photo: &PhotoRequest, ratio: &str, index: usize) -> DerivedSetting {
    let view_port_ratio = view_port_ratio(photo, index);
    let mut min_width = photo.min_width();
    let mut max_width = photo.max_width();
    let mut screen_min_width = 0;
    let mut screen_max_width = 0;

    let screen_entry = photo
        .screen_sizes
        .as_ref()
        .and_then(|sizes| sizes.get(index))
        .filter(|entry| !entry.is_empty());

    if let Some(entry) = screen_entry {
        (screen_min_width, screen_max_width) = screen_bounds(entry, view_port_ratio);

        if screen_min_width > 0 {
            min_width = u32::try_from(screen_min_width).unwrap_or(u32::MAX);
        }
        if screen_max_width > 0 {
            max_width = u32::try_from(screen_max_width)
                .unwrap_or(u32::MAX)
                .min(max_width);
        }
    }

    min_width = min_width.min(max_width);

    if photo.retina != Some(false) {
        max_width = max_width.saturating_mul(2);
    }

    DerivedSetting {
        create_derived: true,
        bytes_step: photo.bytes_step(),
        min_width,
        max_width,
        screen_min_width,
        screen_max_width,
        max_images: photo.max_images(),
        transformation: transformation_for(photo, ratio),
        view_port_ratio,
    }
}

/// Derive settings for every declared aspect ratio, rejecting malformed
/// `aspect_ratio` values before anything is uploaded.
pub fn derive_all(photo: &PhotoRequest) -> Result<Vec<DerivedSetting>> {
    photo
        .aspect_ratios()
        .into_iter()
        .enumerate()
        .map(|(index, ratio)| -> Result<DerivedSetting> {
            let setting = derive_settings(photo, ratio, index);
            if let Some(aspect_ratio) = &setting.transformation.aspect_ratio {
                AspectRatio::parse(aspect_ratio)?;
            }
            Ok(setting)
        })
        .collect()
}
