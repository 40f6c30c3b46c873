/// Joins the parts with single spaces, collapsing any run of whitespace
/// (including line breaks inside a part) and trimming both ends.
pub fn collapse_whitespace<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
