pub fn quote(s: &str) -> String {
    format!("\"{}\"", s)
}

pub fn single_quote(s: &str) -> String {
    format!("'{}'", s)
}
