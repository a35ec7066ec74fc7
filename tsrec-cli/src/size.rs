use crate::error::AppError;

/// Parse a byte count with an optional binary unit: `B`, `K`/`KB`, `M`/`MB`,
/// `G`/`GB`, `T`/`TB` (case-insensitive, powers of 1024).
pub fn parse_size(size_str: &str) -> Result<u64, AppError> {
    let size_str = size_str.trim().to_lowercase();

    if size_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    let split = size_str
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size_str.len());
    let (numeric_part, unit_part) = size_str.split_at(split);

    if unit_part.is_empty() {
        return numeric_part
            .parse::<u64>()
            .map_err(|_| AppError::ParseError(format!("Invalid number: {size_str}")));
    }

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number: {size_str}")))?;

    let multiplier: u64 = match unit_part.trim() {
        "b" => 1,
        "k" | "kb" => 1 << 10,
        "m" | "mb" => 1 << 20,
        "g" | "gb" => 1 << 30,
        "t" | "tb" => 1 << 40,
        unit => return Err(AppError::ParseError(format!("Unknown size unit: {unit}"))),
    };

    Ok((value * multiplier as f64) as u64)
}
