use quill_storage::models::Note;

const INSTRUCTION: &str = "Given references and question below. Answer the question directly without asking again with question language";

/// `Reference {i}`, title and content per note, 1-based, in the given order.
pub fn build_references(notes: &[&Note]) -> String {
	let mut lines = Vec::with_capacity(notes.len() * 3);

	for (idx, note) in notes.iter().enumerate() {
		lines.push(format!("Reference {}", idx + 1));
		lines.push(note.title.clone());
		lines.push(note.content.clone());
	}

	lines.join("\n")
}

pub fn build_prompt(references: &str, question: &str) -> String {
	format!("{INSTRUCTION}\n\n{references}\n\nQuestion:\n{question}\n\nYour answer: ...")
}
