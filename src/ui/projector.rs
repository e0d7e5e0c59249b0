use crate::common::{ChatMessage, DisplayLine};

use super::colors::color_for_username;

/// The last `max_visible_lines - 1` messages of the sorted mirror, ready to
/// render. One row is left for the local input line.
pub fn project(mirror: &[ChatMessage], max_visible_lines: usize) -> Vec<DisplayLine> {
    let shown = max_visible_lines.saturating_sub(1);
    let start = mirror.len().saturating_sub(shown);
    mirror[start..]
        .iter()
        .map(|message| DisplayLine {
            id: message.id.clone(),
            username: message.username.clone(),
            text: message.text.clone(),
            color: color_for_username(&message.username),
        })
        .collect()
}

/// Blank rows needed above `lines` to fill a window of `max_visible_lines`
/// including the input line.
pub fn padding(lines: usize, max_visible_lines: usize) -> usize {
    max_visible_lines.saturating_sub(1).saturating_sub(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror(count: usize) -> Vec<ChatMessage> {
        (0..count)
            .map(|index| ChatMessage {
                id: format!("m{index}"),
                username: if index % 2 == 0 { "alice" } else { "bob" }.to_string(),
                text: format!("line {index}"),
                timestamp: index as i64,
            })
            .collect()
    }

    #[test]
    fn keeps_last_width_minus_one_messages() {
        let lines = project(&mirror(10), 6);
        let ids: Vec<_> = lines.iter().map(|line| line.id.as_str()).collect();
        assert_eq!(ids, ["m5", "m6", "m7", "m8", "m9"]);
        assert_eq!(padding(lines.len(), 6), 0);
    }

    #[test]
    fn short_mirror_is_padded() {
        let lines = project(&mirror(2), 6);
        assert_eq!(lines.len(), 2);
        assert_eq!(padding(lines.len(), 6), 3);
    }

    #[test]
    fn colors_follow_username() {
        let lines = project(&mirror(2), 6);
        assert_eq!(lines[0].color, color_for_username("alice"));
        assert_eq!(lines[1].color, color_for_username("bob"));
    }

    #[test]
    fn degenerate_widths_show_nothing() {
        assert!(project(&mirror(3), 1).is_empty());
        assert!(project(&mirror(3), 0).is_empty());
        assert_eq!(padding(0, 0), 0);
    }
}
