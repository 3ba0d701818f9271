//! Comment wording
//!
//! Comments on the record are the only way submitters hear about a verdict.
//! Rejections grow more apologetic as failures accumulate.

use qb_common::parser::ParseFailure;
use qb_common::{Quote, QuoteType};

fn format_help(quote_type: QuoteType) -> &'static str {
    match quote_type {
        QuoteType::Simple => {
            "Put the speaker's name in the title and what they said in the description. \
             A date (YYYY-MM-DD) on the last line of the description is optional."
        }
        QuoteType::Multi => {
            "Write one line per speaker as `name: what they said`, either in the title or in \
             the description. If several speakers share a line, wrap what each said in \
             double quotes. You may add one date line (YYYY-MM-DD or `unknown`), one line of \
             context, and `---` to end the quote."
        }
    }
}

/// Comment for an accepted quote
pub fn acknowledgement(quote: &Quote) -> String {
    let speakers = quote.speakers();
    match speakers.len() {
        1 => format!("Thanks! Quote from {} accepted.", speakers[0]),
        n => format!("Thanks! Conversation between {} speakers accepted.", n),
    }
}

/// Comment for an accepted quote longer than the display comfortably shows
pub fn too_long(quote: &Quote, max_length: usize) -> String {
    format!(
        "Thanks, quote accepted. At {} characters it is longer than the {} that fit on the \
         board, so it may be cut short when shown. Consider trimming it.",
        quote.char_count(),
        max_length
    )
}

/// Comment for a rejected quote
pub fn rejection(
    failure: &ParseFailure,
    num_failures: u32,
    quote_type: QuoteType,
    helper_added: bool,
) -> String {
    let opening = match num_failures {
        0 | 1 => format!("I couldn't read this quote: {}.", failure),
        2 => format!("Sorry, I still couldn't read this quote: {}.", failure),
        n => format!(
            "I'm really sorry, this is attempt {} and I still can't read this quote: {}. \
             It's probably me, not you.",
            n, failure
        ),
    };

    let mut comment = format!("{}\n\n{}", opening, format_help(quote_type));
    if helper_added {
        comment.push_str("\n\nI've added a human helper to this task to lend a hand.");
    }
    comment.push_str("\n\nEdit the task and I'll take another look.");
    comment
}
