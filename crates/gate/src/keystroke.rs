//! Character-to-keystroke encoding and paced injection
//!
//! Each character becomes exactly one atomic key combination, submitted
//! with a fixed delay before the next. Guest input queues drop rapid
//! bursts, so delivery reliability is traded for throughput.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use vmgate_common::{Error, KeyStroke, Result};

use crate::control::ControlPlane;

/// Plain punctuation: one key, no modifier
static PLAIN_SYMBOLS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (' ', "KEY_SPACE"),
        ('-', "KEY_MINUS"),
        ('=', "KEY_EQUAL"),
        ('[', "KEY_LEFTBRACE"),
        (']', "KEY_RIGHTBRACE"),
        ('\\', "KEY_BACKSLASH"),
        (';', "KEY_SEMICOLON"),
        ('\'', "KEY_APOSTROPHE"),
        (',', "KEY_COMMA"),
        ('.', "KEY_DOT"),
        ('/', "KEY_SLASH"),
        ('`', "KEY_GRAVE"),
    ])
});

/// Shifted punctuation: mapped to shift plus the base key
static SHIFTED_SYMBOLS: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ('~', "KEY_GRAVE"),
        ('!', "KEY_1"),
        ('@', "KEY_2"),
        ('#', "KEY_3"),
        ('$', "KEY_4"),
        ('%', "KEY_5"),
        ('^', "KEY_6"),
        ('&', "KEY_7"),
        ('*', "KEY_8"),
        ('(', "KEY_9"),
        (')', "KEY_0"),
        ('_', "KEY_MINUS"),
        ('+', "KEY_EQUAL"),
        ('{', "KEY_LEFTBRACE"),
        ('}', "KEY_RIGHTBRACE"),
        ('|', "KEY_BACKSLASH"),
        (':', "KEY_SEMICOLON"),
        ('"', "KEY_APOSTROPHE"),
        ('<', "KEY_COMMA"),
        ('>', "KEY_DOT"),
        ('?', "KEY_SLASH"),
    ])
});

/// Encode one character as an atomic key combination.
///
/// Modifier symbols precede the base symbol. Characters outside the
/// mapped classes abort injection with UnsupportedCharacter.
pub fn char_to_keystroke(c: char) -> Result<KeyStroke> {
    if c.is_ascii_lowercase() {
        return Ok(KeyStroke::single(format!("KEY_{}", c.to_ascii_uppercase())));
    }
    if c.is_ascii_uppercase() {
        return Ok(KeyStroke::shifted(format!("KEY_{}", c)));
    }
    if c.is_ascii_digit() {
        return Ok(KeyStroke::single(format!("KEY_{}", c)));
    }
    if c == '\n' {
        return Ok(KeyStroke::single("KEY_ENTER"));
    }
    if let Some(key) = PLAIN_SYMBOLS.get(&c) {
        return Ok(KeyStroke::single(*key));
    }
    if let Some(key) = SHIFTED_SYMBOLS.get(&c) {
        return Ok(KeyStroke::shifted(*key));
    }
    Err(Error::UnsupportedCharacter(c))
}

/// Submit one keystroke to the domain's focused input.
fn send_keystroke<C: ControlPlane>(control: &C, domain: &str, stroke: &KeyStroke) -> Result<()> {
    let mut args = vec!["send-key", domain, "--codeset", "linux"];
    args.extend(stroke.keys().iter().map(|k| k.as_str()));
    control.run(&args)?.into_result("send-key")?;
    Ok(())
}

/// Type literal text into the domain's focused input, one paced keystroke
/// per character, optionally followed by enter.
///
/// The first failed submission aborts the whole operation; partially
/// typed text remains in the guest.
pub fn type_text<C: ControlPlane>(
    control: &C,
    domain: &str,
    text: &str,
    press_enter: bool,
    delay_ms: i64,
) -> Result<()> {
    let delay = Duration::from_millis(delay_ms.max(0) as u64);
    info!(
        "typing {} characters into domain '{}' ({}ms between keys)",
        text.chars().count(),
        domain,
        delay.as_millis()
    );

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let stroke = char_to_keystroke(c)?;
        debug!("sending {:?} for {:?}", stroke.keys(), c);
        send_keystroke(control, domain, &stroke)?;
        // Pause before the next character only; the last key (and any
        // trailing enter) goes out unpaced.
        if chars.peek().is_some() {
            thread::sleep(delay);
        }
    }

    if press_enter {
        send_keystroke(control, domain, &KeyStroke::single("KEY_ENTER"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::ScriptedControl;

    #[test]
    fn lowercase_letters_are_single_keys() {
        for c in 'a'..='z' {
            let stroke = char_to_keystroke(c).unwrap();
            assert_eq!(stroke.keys().len(), 1, "char {:?}", c);
            assert_eq!(stroke.keys()[0], format!("KEY_{}", c.to_ascii_uppercase()));
        }
    }

    #[test]
    fn uppercase_letters_lead_with_shift() {
        for c in 'A'..='Z' {
            let stroke = char_to_keystroke(c).unwrap();
            assert_eq!(stroke.keys().len(), 2, "char {:?}", c);
            assert_eq!(stroke.keys()[0], "KEY_LEFTSHIFT");
            assert_eq!(stroke.keys()[1], format!("KEY_{}", c));
        }
    }

    #[test]
    fn digits_and_punctuation() {
        assert_eq!(char_to_keystroke('7').unwrap().keys(), ["KEY_7"]);
        assert_eq!(char_to_keystroke('-').unwrap().keys(), ["KEY_MINUS"]);
        assert_eq!(
            char_to_keystroke(':').unwrap().keys(),
            ["KEY_LEFTSHIFT", "KEY_SEMICOLON"]
        );
        assert_eq!(char_to_keystroke('\\').unwrap().keys(), ["KEY_BACKSLASH"]);
        assert_eq!(char_to_keystroke('\n').unwrap().keys(), ["KEY_ENTER"]);
    }

    #[test]
    fn non_ascii_is_unsupported() {
        for c in ['п', 'é', '€', '\t'] {
            assert!(matches!(
                char_to_keystroke(c),
                Err(Error::UnsupportedCharacter(_))
            ));
        }
    }

    #[test]
    fn type_text_sends_one_combination_per_char() {
        let control = ScriptedControl::new(vec![
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
        ]);

        type_text(&control, "win11-gate", "Hi", true, 0).unwrap();

        let calls = control.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            vec!["send-key", "win11-gate", "--codeset", "linux", "KEY_LEFTSHIFT", "KEY_H"]
        );
        assert_eq!(
            calls[1],
            vec!["send-key", "win11-gate", "--codeset", "linux", "KEY_I"]
        );
        assert_eq!(
            calls[2],
            vec!["send-key", "win11-gate", "--codeset", "linux", "KEY_ENTER"]
        );
    }

    #[test]
    fn failed_submission_aborts_immediately() {
        let control = ScriptedControl::new(vec![
            ScriptedControl::ok(""),
            ScriptedControl::fail("error: guest agent is not responding"),
        ]);

        let err = type_text(&control, "win11-gate", "abc", false, 0).unwrap_err();
        assert!(matches!(err, Error::Operation { .. }));
        assert_eq!(control.calls.borrow().len(), 2);
    }

    #[test]
    fn unsupported_character_aborts_mid_sequence() {
        let control = ScriptedControl::new(vec![ScriptedControl::ok("")]);

        let err = type_text(&control, "win11-gate", "aя", false, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCharacter('я')));
        assert_eq!(control.calls.borrow().len(), 1);
    }

    #[test]
    fn no_pause_after_the_final_character() {
        let control = ScriptedControl::new(vec![
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
        ]);

        let started = std::time::Instant::now();
        type_text(&control, "win11-gate", "a", true, 200).unwrap();

        // One character plus enter: no inter-key gap applies.
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(control.calls.borrow().len(), 2);
    }

    #[test]
    fn negative_delay_is_clamped() {
        let control = ScriptedControl::new(vec![ScriptedControl::ok("")]);
        type_text(&control, "win11-gate", "a", false, -50).unwrap();
    }
}
