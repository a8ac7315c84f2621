use crate::types::{Configuration, Note, Progress};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Pages in the mushaf. The page after the last one wraps back to 1.
pub const TOTAL_PAGES: u32 = 604;

const NOTES_HEADER: &str = "Notes:";

/// A fully rendered reminder: the announcement plus zero or more notes
/// messages, each one short enough to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub main: String,
    pub notes_chunks: Vec<String>,
}

pub fn next_page(last_page: u32) -> u32 {
    if last_page >= TOTAL_PAGES {
        1
    } else {
        last_page + 1
    }
}

/// Renders the daily announcement: optional role mention, a link to the next
/// page of the mushaf, and the next hadith number.
pub fn compose_main(configuration: &Configuration, progress: &Progress, mention_role: bool) -> String {
    let page = next_page(progress.last_page);
    let mut message = String::new();
    if mention_role {
        if let Some(role) = &configuration.role_id {
            message.push_str(role);
            message.push(' ');
        }
    }
    message.push_str("📢\n");
    message.push_str(&format!("Page: [{page}](https://quran.com/page/{page})\n"));
    message.push_str(&format!("Hadith: {}", progress.last_hadith.saturating_add(1)));
    message
}

/// Splits the numbered notes list into messages of at most `max_len`
/// characters. Notes keep their creation order and 1-based numbers; the
/// header appears on the first chunk only. A note too long for a single
/// message is hard-split, with its number repeated on every piece.
pub fn compose_notes(notes: &[Note], max_len: usize) -> Vec<String> {
    if notes.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::from(NOTES_HEADER);
    for (index, note) in notes.iter().enumerate() {
        let label = format!("{}. ", index + 1);
        let line = format!("{label}{}", note.note);
        if char_len(&line) > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let piece_len = max_len.saturating_sub(char_len(&label)).max(1);
            for piece in char_chunks(&note.note, piece_len) {
                chunks.push(format!("{label}{piece}"));
            }
        } else if current.is_empty() {
            current = line;
        } else if char_len(&current) + 1 + char_len(&line) <= max_len {
            current.push('\n');
            current.push_str(&line);
        } else {
            chunks.push(std::mem::take(&mut current));
            current = line;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn compose_reminder(
    configuration: &Configuration,
    progress: &Progress,
    notes: &[Note],
    mention_role: bool,
) -> Reminder {
    Reminder {
        main: compose_main(configuration, progress, mention_role),
        notes_chunks: compose_notes(notes, MAX_MESSAGE_LEN),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_chunks(s: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        let split = rest
            .char_indices()
            .nth(size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (piece, tail) = rest.split_at(split);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}
