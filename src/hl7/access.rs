use crate::hl7::{COMPONENT_SEPARATOR, Message, REPETITION_SEPARATOR, Segment};

/// First segment with the given name. Later duplicates are not visible here.
pub(crate) fn find_segment<'m>(msg: &'m Message, name: &str) -> Option<&'m Segment> {
    msg.segments.iter().find(|s| s.name == name)
}

pub(crate) fn segments_named<'m>(
    msg: &'m Message,
    name: &'m str,
) -> impl Iterator<Item = &'m Segment> + 'm {
    msg.segments.iter().filter(move |s| s.name == name)
}

/// Trimmed 1-based field, empty when absent.
pub(crate) fn field(seg: &Segment, n: usize) -> &str {
    seg.fields.get(n).map(|f| f.trim()).unwrap_or_default()
}

pub(crate) fn first_repetition(value: &str) -> &str {
    value
        .split(REPETITION_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
}

/// Trimmed 1-based component, empty when absent.
pub(crate) fn component(value: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    value
        .split(COMPONENT_SEPARATOR)
        .nth(n - 1)
        .unwrap_or_default()
        .trim()
}

/// `component(first_repetition(field(seg, n)), c)`, the usual CX/XPN/CE lookup.
pub(crate) fn field_component(seg: &Segment, n: usize, c: usize) -> &str {
    component(first_repetition(field(seg, n)), c)
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hl7::parse;
    use rstest::rstest;

    #[test]
    fn repetition_then_component() {
        let value = "a^b^c~x^y^z";
        let first = first_repetition(value);

        assert_eq!(first, "a^b^c");
        assert_eq!(component(first, 2), "b");
    }

    #[rstest]
    #[case("", "")]
    #[case("abc", "abc")]
    #[case(" abc ~def", "abc")]
    #[case("~def", "")]
    fn first_repetition_cases(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(first_repetition(value), expected);
    }

    #[rstest]
    #[case("Doe^Jane", 1, "Doe")]
    #[case("Doe^Jane", 2, "Jane")]
    #[case("Doe^ Jane ", 2, "Jane")]
    #[case("Doe^Jane", 3, "")]
    #[case("Doe^Jane", 0, "")]
    #[case("", 1, "")]
    fn component_cases(#[case] value: &str, #[case] n: usize, #[case] expected: &str) {
        assert_eq!(component(value, n), expected);
    }

    #[test]
    fn field_lookup_never_fails() {
        let msg = parse("MSH|^~\\&|APP\rPID|1|| MRN1 ^^^H~MRN2").unwrap();
        let pid = find_segment(&msg, "PID").unwrap();

        assert_eq!(field(pid, 3), "MRN1 ^^^H~MRN2");
        assert_eq!(field(pid, 2), "");
        assert_eq!(field(pid, 0), "");
        assert_eq!(field(pid, 99), "");
        assert_eq!(field_component(pid, 3, 1), "MRN1");
        assert_eq!(field_component(pid, 3, 4), "H");
    }

    #[test]
    fn first_segment_wins() {
        let msg = parse("MSH|^~\\&\rOBX|1\rPID|1||A\rOBX|2\rPID|2||B").unwrap();

        assert_eq!(field(find_segment(&msg, "PID").unwrap(), 3), "A");
        assert!(find_segment(&msg, "PV1").is_none());
        let set_ids: Vec<&str> = segments_named(&msg, "OBX").map(|s| field(s, 1)).collect();
        assert_eq!(set_ids, vec!["1", "2"]);
    }
}
