//! AppleScript sources for the Contacts application.

use crate::applescript_string;

/// Handler appended to every enumeration script: one `name|phones|emails` line.
const PERSON_LINE_HANDLER: &str = r#"
on personLine(p)
    tell application "Contacts"
        set phoneParts to {}
        repeat with ph in phones of p
            set end of phoneParts to ((label of ph) as text) & ": " & ((value of ph) as text)
        end repeat
        set emailParts to {}
        repeat with em in emails of p
            set end of emailParts to ((label of em) as text) & ": " & ((value of em) as text)
        end repeat
        set AppleScript's text item delimiters to ";"
        set phoneText to phoneParts as text
        set emailText to emailParts as text
        set AppleScript's text item delimiters to ""
        return ((name of p) as text) & "|" & phoneText & "|" & emailText
    end tell
end personLine
"#;

pub(crate) fn count_script() -> String {
    "tell application \"Contacts\" to return (count of people) as text".to_string()
}

/// People `offset+1 ..= offset+limit`; `limit = None` runs to the end.
pub(crate) fn page_script(offset: usize, limit: Option<usize>) -> String {
    let end_clause = match limit {
        Some(limit) => format!(
            "set endIndex to {end}\n    if endIndex > totalCount then set endIndex to totalCount",
            end = offset.saturating_add(limit)
        ),
        None => "set endIndex to totalCount".to_string(),
    };
    format!(
        r#"tell application "Contacts"
    set totalCount to count of people
    set startIndex to {start}
    if startIndex > totalCount then return "EMPTY|0|" & totalCount
    {end_clause}
    set output to "DATA|" & (endIndex - startIndex + 1) & "|" & totalCount
    repeat with i from startIndex to endIndex
        set output to output & linefeed & my personLine(person i)
    end repeat
    return output
end tell
{PERSON_LINE_HANDLER}"#,
        start = offset.saturating_add(1),
    )
}

/// Server-side `whose name contains` filter, at most `limit` records.
pub(crate) fn search_script(name: &str, limit: usize) -> String {
    format!(
        r#"tell application "Contacts"
    set found to (every person whose name contains {needle})
    set totalCount to count of found
    if totalCount is 0 then return "EMPTY|0|0"
    set endIndex to {limit}
    if endIndex > totalCount then set endIndex to totalCount
    set output to "DATA|" & endIndex & "|" & totalCount
    repeat with i from 1 to endIndex
        set output to output & linefeed & my personLine(item i of found)
    end repeat
    return output
end tell
{PERSON_LINE_HANDLER}"#,
        needle = applescript_string(name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_bounds_are_one_based() {
        let script = page_script(20, Some(10));
        assert!(script.contains("set startIndex to 21"));
        assert!(script.contains("set endIndex to 30"));
        assert!(script.contains("on personLine(p)"));
    }

    #[test]
    fn full_enumeration_runs_to_total() {
        let script = page_script(0, None);
        assert!(script.contains("set startIndex to 1"));
        assert!(script.contains("set endIndex to totalCount"));
    }

    #[test]
    fn search_quotes_the_needle() {
        let script = search_script(r#"Bob "B""#, 5);
        assert!(script.contains(r#"whose name contains "Bob \"B\"""#));
        assert!(script.contains("set endIndex to 5"));
    }
}
