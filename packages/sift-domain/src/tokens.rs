/// Fallback token estimate for chunks ingested without one.
///
/// The ratio of characters to embedding-model tokens is language-dependent,
/// so this deliberately leans low (more tokens per character than English
/// needs). An underestimate only means a larger embedding call, which the
/// oversized-input split path recovers from.
pub fn estimate_tokens(text: &str) -> u32 {
	let chars = text.chars().count();

	(chars as u32).div_ceil(4).max(1)
}
