const MAX_OUTPUT_LENGTH: usize = 15_000;
const MAX_ERROR_LENGTH: usize = 2_000;

/// Largest char boundary at or below `index`.
fn floor_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Keep the head and tail of an oversized output, dropping the middle.
pub fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_OUTPUT_LENGTH {
        return output.to_string();
    }
    let half = MAX_OUTPUT_LENGTH / 2;
    let head_end = floor_boundary(output, half);
    let mut tail_start = output.len() - half;
    while !output.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n\n... [truncated {} chars] ...\n\n{}",
        &output[..head_end],
        tail_start - head_end,
        &output[tail_start..]
    )
}

pub fn truncate_error(error: &str) -> String {
    if error.len() <= MAX_ERROR_LENGTH {
        error.to_string()
    } else {
        format!("{}...", &error[..floor_boundary(error, MAX_ERROR_LENGTH)])
    }
}

/// First `max` bytes of `text` on a char boundary, with an ellipsis when cut.
pub fn preview(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        format!("{}...", &text[..floor_boundary(text, max)])
    }
}
