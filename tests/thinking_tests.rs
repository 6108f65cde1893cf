//! Tests for the thinking-tag parser — dialect behavior and incremental
//! equivalence under arbitrary chunking.

use chorus::thinking::ThinkingAccumulator;
use proptest::prelude::*;
use rstest::rstest;

/// Feed the whole text in one call.
fn parse_whole(text: &str) -> (String, String) {
    let mut acc = ThinkingAccumulator::new();
    acc.push(text);
    acc.finish();
    acc.into_parts()
}

/// Feed the text in chunks of the given char counts (cycled).
fn parse_chunked(text: &str, sizes: &[usize]) -> (String, String) {
    let mut acc = ThinkingAccumulator::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut k = 0;
    while i < chars.len() {
        let size = sizes.get(k % sizes.len()).copied().unwrap_or(1).max(1);
        let chunk: String = chars[i..(i + size).min(chars.len())].iter().collect();
        acc.push(&chunk);
        i += size;
        k += 1;
    }
    acc.finish();
    acc.into_parts()
}

// ---------------------------------------------------------------------------
// Specified fixtures
// ---------------------------------------------------------------------------

#[test]
fn test_explicit_pair_fixture() {
    let (answer, thinking) = parse_whole("<think>abc</think>def");
    assert_eq!(thinking, "abc");
    assert_eq!(answer, "def");
}

#[test]
fn test_tag_split_across_chunks_fixture() {
    let mut acc = ThinkingAccumulator::new();
    acc.push("<thi");
    acc.push("nk>abc</thi");
    acc.push("nk>def");
    acc.finish();
    assert_eq!(acc.thinking(), "abc");
    assert_eq!(acc.answer(), "def");
}

#[test]
fn test_harmony_fixture() {
    let (answer, thinking) =
        parse_whole("<|channel|>analysis<|message|>reasoning<|channel|>final<|message|>answer");
    assert!(thinking.contains("reasoning"));
    assert_eq!(answer, "answer");
}

#[test]
fn test_no_tags_all_answer() {
    let (answer, thinking) = parse_whole("there are no markers in this stream");
    assert_eq!(answer, "there are no markers in this stream");
    assert!(thinking.is_empty());
}

// ---------------------------------------------------------------------------
// Dialect table
// ---------------------------------------------------------------------------

#[rstest]
#[case::explicit("<think>abc</think>def", "def", "abc")]
#[case::explicit_long("<thinking>plan</thinking>go", "go", "plan")]
#[case::answer_before("pre<think>mid</think>post", "prepost", "mid")]
#[case::repeated("<think>a</think>b<think>c</think>d", "bd", "ac")]
#[case::implicit("reason</think>answer", "answer", "reason")]
#[case::implicit_long("deep</thinking>out", "out", "deep")]
#[case::plain("no markup here", "no markup here", "")]
#[case::harmony(
    "<|channel|>analysis<|message|>why<|channel|>final<|message|>because",
    "because",
    "why"
)]
fn dialect_cases(#[case] input: &str, #[case] answer: &str, #[case] thinking: &str) {
    let (got_answer, got_thinking) = parse_whole(input);
    assert_eq!(got_answer, answer);
    assert_eq!(got_thinking, thinking);
}

// Every dialect case must survive char-at-a-time delivery unchanged.
#[rstest]
#[case("<think>abc</think>def")]
#[case("<thinking>plan</thinking>go")]
#[case("pre<think>mid</think>post")]
#[case("reason</think>answer")]
#[case("<|channel|>analysis<|message|>why<|channel|>final<|message|>because")]
#[case("x < y and y > z")]
fn char_at_a_time_equivalence(#[case] input: &str) {
    assert_eq!(parse_chunked(input, &[1]), parse_whole(input));
}

// ---------------------------------------------------------------------------
// Incremental-equivalence property
// ---------------------------------------------------------------------------

fn fragment() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("<think>"),
        Just("</think>"),
        Just("<thinking>"),
        Just("</thinking>"),
        Just("<|channel|>"),
        Just("<|message|>"),
        Just("<|end|>"),
        Just("analysis"),
        Just("final"),
        Just("hello world "),
        Just("< "),
        Just("|"),
        Just("é𝄞 "),
        Just("."),
    ]
}

proptest! {
    #[test]
    fn prop_chunking_never_changes_output(
        fragments in prop::collection::vec(fragment(), 0..12),
        sizes in prop::collection::vec(1usize..9, 1..8),
    ) {
        let text: String = fragments.concat();
        prop_assert_eq!(parse_chunked(&text, &sizes), parse_whole(&text));
    }

    #[test]
    fn prop_plain_text_is_identity(
        words in prop::collection::vec("[a-z ]{0,12}", 0..8),
        sizes in prop::collection::vec(1usize..5, 1..6),
    ) {
        let text: String = words.concat();
        let (answer, thinking) = parse_chunked(&text, &sizes);
        prop_assert_eq!(answer, text);
        prop_assert_eq!(thinking, "");
    }
}

// ---------------------------------------------------------------------------
// Implicit-dialect edge cases
// ---------------------------------------------------------------------------

#[test]
fn test_implicit_demotes_across_many_chunks() {
    let mut acc = ThinkingAccumulator::new();
    acc.push("step one ");
    acc.push("step two ");
    acc.push("step three</think>");
    acc.push("final answer");
    acc.finish();
    assert_eq!(acc.thinking(), "step one step two step three");
    assert_eq!(acc.answer(), "final answer");
}

#[test]
fn test_unterminated_thinking_stays_thinking() {
    let mut acc = ThinkingAccumulator::new();
    acc.push("<think>the model never closes this");
    acc.finish();
    assert_eq!(acc.thinking(), "the model never closes this");
    assert!(acc.answer().is_empty());
}

#[test]
fn test_second_close_is_not_demoted_again() {
    let (answer, thinking) = parse_whole("a</think>b</think>c");
    assert_eq!(thinking, "a");
    assert_eq!(answer, "bc");
}
