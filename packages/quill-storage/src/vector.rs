//! pgvector text encoding. Vectors travel as `[x,y,...]` text and are cast with `::text::vector`.

use crate::{Error, Result};

pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (idx, value) in vec.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_vector_text(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::InvalidArgument("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part.trim().parse().map_err(|_| {
			Error::InvalidArgument("Vector text contains a non-numeric value.".to_string())
		})?;

		vec.push(value);
	}

	Ok(vec)
}

pub fn validate_vector_dim(vec: &[f32], expected_dim: u32) -> Result<()> {
	if vec.len() != expected_dim as usize {
		return Err(Error::InvalidArgument(format!(
			"Embedding dimension {} does not match configured vector dim {}.",
			vec.len(),
			expected_dim
		)));
	}
	if vec.iter().any(|value| !value.is_finite()) {
		return Err(Error::InvalidArgument("Embedding contains a non-finite value.".to_string()));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_text_parses_back() {
		let text = format_vector_text(&[0.5, -1.0, 2.25]);

		assert_eq!(text, "[0.5,-1,2.25]");
		assert_eq!(parse_vector_text(&text).expect("parse failed"), vec![0.5, -1.0, 2.25]);
	}

	#[test]
	fn unbracketed_text_is_rejected() {
		assert!(parse_vector_text("0.5,1.0").is_err());
	}

	#[test]
	fn dimension_mismatch_is_rejected() {
		assert!(validate_vector_dim(&[1.0, 2.0], 3).is_err());
		assert!(validate_vector_dim(&[1.0, f32::NAN, 2.0], 3).is_err());
		assert!(validate_vector_dim(&[1.0, 2.0, 3.0], 3).is_ok());
	}
}
