use anyhow::{anyhow, Result};
use std::time::Duration;

/// Parse the literal of a `within` modifier.
/// A bare number is seconds; "500ms", "2s", "1.5m" carry their own unit.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();

    let (number_part, unit_part) = split_number_and_unit(input)?;
    let value: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", number_part))?;
    if !value.is_finite() || value < 0.0 {
        return Err(anyhow!("Duration must be a positive number: {}", input));
    }

    let multiplier = match unit_part.trim() {
        "ms" | "milliseconds" | "millisecond" => 1.0,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        other => return Err(anyhow!("Unknown time unit: {}", other)),
    };

    Ok(Duration::from_millis((value * multiplier).round() as u64))
}

fn split_number_and_unit(input: &str) -> Result<(&str, &str)> {
    let split_pos = input
        .char_indices()
        .find(|(_, ch)| ch.is_alphabetic())
        .map(|(i, _)| i)
        .unwrap_or(input.len());

    let number_part = &input[..split_pos];
    let unit_part = &input[split_pos..];

    if number_part.trim().is_empty() {
        return Err(anyhow!("No numeric value in duration: {}", input));
    }

    Ok((number_part, unit_part))
}
