//! Prompt text used when the caller does not provide one.
//!
//! Defaults are applied per mode after the request has been classified, so a
//! text-only request with no prompt is still rejected instead of silently
//! sending a canned question.
//!
//! Callers can override the image and PDF defaults via
//! [`crate::config::DefaultPrompts`].

/// Default question for a single uploaded image.
pub const DEFAULT_IMAGE_PROMPT: &str = "What is in this image?";

/// Default question for an uploaded PDF.
pub const DEFAULT_PDF_PROMPT: &str = "Summarize the overall structure of this document.";

/// Wrap extracted PDF text and a question into a single prompt for a
/// text-only model.
pub fn pdf_text_question(text: &str, page_count: usize, question: &str) -> String {
    let mut prompt = format!("The following is the content of a PDF document:\n\n{text}\n\n");
    if page_count > 0 {
        prompt.push_str(&format!("The PDF has {page_count} pages.\n\n"));
    }
    prompt.push_str(&format!(
        "Question: {question}\n\nAnswer the question based on the PDF content above."
    ));
    prompt
}
