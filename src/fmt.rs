/// Format minor units as a dollar amount with thousands separators: $1,234.56
pub fn money(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let int_part = (abs / 100).to_string();
    let dec_part = abs % 100;

    let mut with_commas = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            with_commas.push(',');
        }
        with_commas.push(c);
    }
    let with_commas: String = with_commas.chars().rev().collect();

    if negative {
        format!("-${with_commas}.{dec_part:02}")
    } else {
        format!("${with_commas}.{dec_part:02}")
    }
}

/// Format a 0..1 confidence as a whole percentage.
pub fn percent(confidence: f64) -> String {
    format!("{:.0}%", (confidence * 100.0).round())
}
