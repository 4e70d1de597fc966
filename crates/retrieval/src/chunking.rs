const PARAGRAPH_BREAK: &str = "\n\n";

/// Packs consecutive markdown paragraphs into chunks of roughly
/// `max_chunk_chars`. A single oversized paragraph becomes its own chunk.
pub fn chunk_document(body: &str, max_chunk_chars: usize) -> Vec<String> {
    let mut chunks: Vec<Vec<&str>> = Vec::new();
    let mut width = 0;

    for paragraph in body.split(PARAGRAPH_BREAK).map(str::trim) {
        if paragraph.is_empty() {
            continue;
        }

        let extra = paragraph.len() + PARAGRAPH_BREAK.len();
        match chunks.last_mut() {
            Some(open) if width + extra <= max_chunk_chars => {
                open.push(paragraph);
                width += extra;
            }
            _ => {
                chunks.push(vec![paragraph]);
                width = paragraph.len();
            }
        }
    }

    chunks
        .into_iter()
        .map(|paragraphs| paragraphs.join(PARAGRAPH_BREAK))
        .collect()
}

/// Plain-text policy corpora keep one statement per line.
pub fn chunk_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_paragraphs_up_to_the_width() {
        let body = "# Fees\n\nTransfers are free.\n\nATM withdrawals cost $2.\n\n";
        assert_eq!(
            chunk_document(body, 40),
            vec!["# Fees\n\nTransfers are free.", "ATM withdrawals cost $2."]
        );

        let chunks = chunk_document(&"# title\n\nabc\n\n".repeat(40), 120);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.len() <= 120));
    }

    #[test]
    fn line_chunks_skip_blanks_and_comments() {
        let body = "# fees\nTransfers are free.\n\n  ATM withdrawals cost $2.  \n";
        assert_eq!(
            chunk_lines(body),
            vec!["Transfers are free.", "ATM withdrawals cost $2."]
        );
    }
}
