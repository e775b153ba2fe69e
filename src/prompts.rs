//! Prompt text sent to the vision and generation models.
//!
//! Both prompts live here so the annotation stage, the chat facade, and their tests read the
//! same strings.

/// Instruction sent alongside every extracted image during annotation.
pub const IMAGE_DESCRIPTION_PROMPT: &str = "Describe the content of this image concisely and precisely, focusing on any numerical data present. If no numerical data is present, simply describe the image.";

/// Question-answering template; `{context}` and `{question}` are substituted per request.
pub const RAG_TEMPLATE: &str = r#"
You are an assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.
If you don't know the answer based on the context, just say that you don't know.
Keep the answer concise and helpful.

CONTEXT:
{context}

QUESTION:
{question}

ANSWER:
"#;

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Fill the question-answering template with retrieved context and the user question.
///
/// The context is substituted first so a question containing the literal `{context}` is left
/// untouched.
pub fn render_rag_prompt(context: &str, question: &str) -> String {
    let (head, tail) = RAG_TEMPLATE
        .split_once("{question}")
        .unwrap_or((RAG_TEMPLATE, ""));
    let mut prompt = head.replace("{context}", context);
    prompt.push_str(question);
    prompt.push_str(tail);
    prompt
}
