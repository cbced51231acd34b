//! Interactive handshake patterns and PSK modifiers.

use std::fmt;

/// Message token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    E,   // ephemeral
    S,   // static
    EE,  // DH(e, re)
    ES,  // DH(e, rs) or DH(s, re)
    SE,  // DH(s, re) or DH(e, rs)
    SS,  // DH(s, rs)
    Psk, // pre-shared key
}

/// Base handshake pattern.
///
/// The first letter describes the initiator's static key
/// (N: none, K: known to responder, X: transmitted, I: transmitted immediately),
/// the second letter the responder's (N: none, K: known to initiator, X: transmitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    NN,
    NK,
    NX,
    XN,
    XK,
    XX,
    KN,
    KK,
    KX,
    IN,
    IK,
    IX,
}

use Token::*;

impl Pattern {
    /// All supported base patterns.
    pub const ALL: &'static [Pattern] = &[
        Pattern::NN,
        Pattern::NK,
        Pattern::NX,
        Pattern::XN,
        Pattern::XK,
        Pattern::XX,
        Pattern::KN,
        Pattern::KK,
        Pattern::KX,
        Pattern::IN,
        Pattern::IK,
        Pattern::IX,
    ];

    /// Canonical protocol-name token.
    pub fn name(&self) -> &'static str {
        match self {
            Pattern::NN => "NN",
            Pattern::NK => "NK",
            Pattern::NX => "NX",
            Pattern::XN => "XN",
            Pattern::XK => "XK",
            Pattern::XX => "XX",
            Pattern::KN => "KN",
            Pattern::KK => "KK",
            Pattern::KX => "KX",
            Pattern::IN => "IN",
            Pattern::IK => "IK",
            Pattern::IX => "IX",
        }
    }

    /// Looks up a base pattern by exact name.
    pub fn from_name(name: &str) -> Option<Pattern> {
        Pattern::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Initiator's pre-message (`-> s`).
    pub fn initiator_pre_message(&self) -> &'static [Token] {
        match self {
            Pattern::KN | Pattern::KK | Pattern::KX => &[S],
            _ => &[],
        }
    }

    /// Responder's pre-message (`<- s`).
    pub fn responder_pre_message(&self) -> &'static [Token] {
        match self {
            Pattern::NK | Pattern::XK | Pattern::KK | Pattern::IK => &[S],
            _ => &[],
        }
    }

    /// Message patterns, alternating initiator → responder → initiator.
    pub fn message_patterns(&self) -> &'static [&'static [Token]] {
        match self {
            Pattern::NN => &[&[E], &[E, EE]],
            Pattern::NK => &[&[E, ES], &[E, EE]],
            Pattern::NX => &[&[E], &[E, EE, S, ES]],
            Pattern::XN => &[&[E], &[E, EE], &[S, SE]],
            Pattern::XK => &[&[E, ES], &[E, EE], &[S, SE]],
            Pattern::XX => &[&[E], &[E, EE, S, ES], &[S, SE]],
            Pattern::KN => &[&[E], &[E, EE, SE]],
            Pattern::KK => &[&[E, ES, SS], &[E, EE, SE]],
            Pattern::KX => &[&[E], &[E, EE, SE, S, ES]],
            Pattern::IN => &[&[E, S], &[E, EE, SE]],
            Pattern::IK => &[&[E, ES, S, SS], &[E, EE, SE]],
            Pattern::IX => &[&[E, S], &[E, EE, SE, S, ES]],
        }
    }

    /// True if the initiator needs a static key pair.
    pub fn initiator_has_static(&self) -> bool {
        !matches!(self, Pattern::NN | Pattern::NK | Pattern::NX)
    }

    /// True if the responder needs a static key pair.
    pub fn responder_has_static(&self) -> bool {
        !matches!(self, Pattern::NN | Pattern::XN | Pattern::KN | Pattern::IN)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A base pattern with optional PSK modifiers applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandshakePattern {
    base: Pattern,
    psk_positions: Vec<usize>,
}

impl HandshakePattern {
    /// Creates a pattern without modifiers.
    pub fn new(base: Pattern) -> Self {
        Self {
            base,
            psk_positions: Vec::new(),
        }
    }

    /// Parses `XX`, `NNpsk0`, `XXpsk0+psk3`, ...
    pub fn parse(name: &str) -> Option<Self> {
        let split = name.find("psk").unwrap_or(name.len());
        let (base_name, modifiers) = name.split_at(split);
        let mut pattern = Self::new(Pattern::from_name(base_name)?);

        if modifiers.is_empty() {
            return Some(pattern);
        }
        for modifier in modifiers.split('+') {
            let digits = modifier.strip_prefix("psk")?;
            if digits.len() != 1 {
                return None;
            }
            let position: usize = digits.parse().ok()?;
            pattern = pattern.with_psk(position)?;
        }
        Some(pattern)
    }

    /// Adds a `pskN` modifier. Returns None if the position does not fit
    /// the pattern or is already present.
    pub fn with_psk(mut self, position: usize) -> Option<Self> {
        if position > self.base.message_patterns().len() || self.psk_positions.contains(&position) {
            return None;
        }
        self.psk_positions.push(position);
        Some(self)
    }

    /// The base pattern.
    pub fn base(&self) -> Pattern {
        self.base
    }

    /// True if any PSK modifier is present.
    pub fn has_psk(&self) -> bool {
        !self.psk_positions.is_empty()
    }

    /// Message token lists with `psk` tokens inserted.
    pub fn messages(&self) -> Vec<Vec<Token>> {
        let mut messages: Vec<Vec<Token>> = self
            .base
            .message_patterns()
            .iter()
            .map(|m| m.to_vec())
            .collect();
        for &pos in &self.psk_positions {
            if pos == 0 {
                messages[0].insert(0, Psk);
            } else {
                messages[pos - 1].push(Psk);
            }
        }
        messages
    }
}

impl fmt::Display for HandshakePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.name())?;
        for (i, pos) in self.psk_positions.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "psk{}", pos)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        for p in Pattern::ALL {
            assert_eq!(Pattern::from_name(p.name()), Some(*p));
        }
        assert_eq!(Pattern::from_name("nn"), None);
        assert_eq!(Pattern::from_name("N"), None);
    }

    #[test]
    fn test_static_requirements_match_tokens() {
        for p in Pattern::ALL {
            let messages = p.message_patterns();
            let initiator_sends_s = messages.iter().step_by(2).any(|m| m.contains(&S));
            let responder_sends_s = messages.iter().skip(1).step_by(2).any(|m| m.contains(&S));
            assert_eq!(
                p.initiator_has_static(),
                initiator_sends_s || !p.initiator_pre_message().is_empty(),
                "{p}"
            );
            assert_eq!(
                p.responder_has_static(),
                responder_sends_s || !p.responder_pre_message().is_empty(),
                "{p}"
            );
        }
    }

    #[test]
    fn test_parse_plain() {
        let p = HandshakePattern::parse("XX").unwrap();
        assert_eq!(p.base(), Pattern::XX);
        assert!(!p.has_psk());
        assert_eq!(p.to_string(), "XX");
    }

    #[test]
    fn test_parse_psk() {
        let p = HandshakePattern::parse("NNpsk0").unwrap();
        assert!(p.has_psk());
        assert_eq!(p.messages()[0], vec![Psk, E]);
        assert_eq!(p.to_string(), "NNpsk0");

        let p = HandshakePattern::parse("XXpsk0+psk3").unwrap();
        let msgs = p.messages();
        assert_eq!(msgs[0], vec![Psk, E]);
        assert_eq!(msgs[2], vec![S, SE, Psk]);
        assert_eq!(p.to_string(), "XXpsk0+psk3");

        let p = HandshakePattern::parse("NNpsk2").unwrap();
        assert_eq!(p.messages()[1], vec![E, EE, Psk]);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(HandshakePattern::parse("NNpsk3").is_none());
        assert!(HandshakePattern::parse("NNpsk").is_none());
        assert!(HandshakePattern::parse("NNpsk12").is_none());
        assert!(HandshakePattern::parse("NNpsk0+psk0").is_none());
        assert!(HandshakePattern::parse("NNpsk0+").is_none());
        assert!(HandshakePattern::parse("ZZ").is_none());
        assert!(HandshakePattern::parse("").is_none());
    }
}
