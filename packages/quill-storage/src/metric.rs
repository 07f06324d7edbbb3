use quill_config::VectorMetric;

/// pgvector distance operator for the metric.
pub fn pg_operator(metric: VectorMetric) -> &'static str {
	match metric {
		VectorMetric::L2 => "<->",
		VectorMetric::Cosine => "<=>",
	}
}

/// Same distance pgvector computes for [`pg_operator`].
pub fn distance(metric: VectorMetric, a: &[f32], b: &[f32]) -> f32 {
	match metric {
		VectorMetric::L2 => l2(a, b),
		VectorMetric::Cosine => cosine(a, b),
	}
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	// pgvector yields NaN for a zero vector, and NaN sorts after every number.
	if norm_a == 0.0 || norm_b == 0.0 {
		return f32::NAN;
	}

	1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn l2_distance_matches_hand_computation() {
		let d = distance(VectorMetric::L2, &[0.0, 0.0], &[3.0, 4.0]);

		assert!((d - 5.0).abs() < 1e-6);
	}

	#[test]
	fn cosine_distance_of_parallel_vectors_is_zero() {
		let d = distance(VectorMetric::Cosine, &[1.0, 2.0], &[2.0, 4.0]);

		assert!(d.abs() < 1e-6);
	}

	#[test]
	fn cosine_distance_of_zero_vector_is_nan() {
		assert!(distance(VectorMetric::Cosine, &[0.0, 0.0], &[1.0, 0.0]).is_nan());
		assert!(distance(VectorMetric::Cosine, &[1.0, 0.0], &[0.0, 0.0]).is_nan());
	}

	#[test]
	fn operators_follow_metric() {
		assert_eq!(pg_operator(VectorMetric::L2), "<->");
		assert_eq!(pg_operator(VectorMetric::Cosine), "<=>");
	}
}
