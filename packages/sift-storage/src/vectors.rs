/// Renders a vector as pgvector text (`[v1,v2,...]`) for a `::text::vector`
/// cast in a bound parameter.
pub fn format_vector_text(vec: &[f32]) -> String {
	let mut out = String::from("[");

	for (idx, value) in vec.iter().enumerate() {
		if idx > 0 {
			out.push(',');
		}
		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}
