//! Noise handshake state machine for every supported pattern.

use thiserror::Error;

use super::cipher::TAG_SIZE;
use super::keypair::{Key, KeyPair};
use super::message::MAX_MESSAGE_SIZE;
use super::pattern::Token;
use super::protocol::Protocol;
use super::state::{CipherError, CipherState, SymmetricState};

/// Handshake configuration.
#[derive(Default)]
pub struct Config {
    /// Resolved protocol.
    pub protocol: Option<Protocol>,
    /// True if this side initiates.
    pub initiator: bool,
    /// Local static key pair.
    pub local_static: Option<KeyPair>,
    /// Remote static public key known before the handshake.
    pub remote_static: Option<Key>,
    /// Remote static key the peer must prove, whether pre-known or transmitted.
    pub expected_remote_static: Option<Key>,
    /// Optional prologue.
    pub prologue: Vec<u8>,
    /// Optional preshared key.
    pub preshared_key: Option<Key>,
}

/// Handshake errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("handshake already finished")]
    Finished,
    #[error("handshake not ready to split")]
    NotReady,
    #[error("invalid handshake message")]
    InvalidMessage,
    #[error("missing protocol")]
    MissingProtocol,
    #[error("missing local static key")]
    MissingLocalStatic,
    #[error("missing remote static key")]
    MissingRemoteStatic,
    #[error("pattern requires a pre-shared key")]
    MissingPsk,
    #[error("pre-shared key given but pattern has no psk modifier")]
    UnexpectedPsk,
    #[error("not our turn")]
    NotOurTurn,
    #[error("decryption failed")]
    Decryption,
    #[error("DH failed")]
    DhFailed,
    #[error("remote static key does not match the expected key")]
    PeerKeyMismatch,
    #[error("handshake message exceeds {} bytes", MAX_MESSAGE_SIZE)]
    PayloadTooLarge,
    #[error("nonce space exhausted")]
    NonceExhausted,
}

impl From<CipherError> for Error {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Decryption => Error::Decryption,
            CipherError::NonceExhausted | CipherError::NonceReuse => Error::NonceExhausted,
        }
    }
}

/// Output of a completed handshake.
pub struct TransportKeys {
    /// Cipher for messages we send.
    pub send: CipherState,
    /// Cipher for messages we receive.
    pub recv: CipherState,
    /// Peer's static key, if the pattern revealed or pre-shared one.
    pub remote_static: Option<Key>,
    /// Final handshake hash (channel binding value).
    pub handshake_hash: Vec<u8>,
}

/// Manages the state of a Noise handshake.
pub struct HandshakeState {
    protocol: Protocol,
    messages: Vec<Vec<Token>>,
    initiator: bool,
    local_static: Option<KeyPair>,
    local_ephemeral: Option<KeyPair>,
    remote_static: Option<Key>,
    remote_ephemeral: Option<Key>,
    expected_remote_static: Option<Key>,
    preshared_key: Option<Key>,
    ss: SymmetricState,
    msg_index: usize,
}

impl HandshakeState {
    /// Creates a new handshake state.
    pub fn new(config: Config) -> Result<Self, Error> {
        let protocol = config.protocol.clone().ok_or(Error::MissingProtocol)?;

        Self::validate_config(&config, &protocol)?;

        let mut ss = SymmetricState::new(&protocol.name(), protocol.cipher, protocol.hash);
        ss.mix_hash(&config.prologue);

        let base = protocol.pattern.base();
        let local_public = config.local_static.as_ref().map(|kp| kp.public.clone());

        // Pre-messages: initiator's first, then responder's.
        for (pre, ours) in [
            (base.initiator_pre_message(), config.initiator),
            (base.responder_pre_message(), !config.initiator),
        ] {
            for token in pre {
                if *token != Token::S {
                    continue;
                }
                let key = if ours { local_public.as_ref() } else { config.remote_static.as_ref() };
                let key = key.ok_or(if ours { Error::MissingLocalStatic } else { Error::MissingRemoteStatic })?;
                ss.mix_hash(key.as_bytes());
            }
        }

        let mut hs = Self {
            messages: protocol.pattern.messages(),
            protocol,
            initiator: config.initiator,
            local_static: config.local_static,
            local_ephemeral: None,
            remote_static: None,
            remote_ephemeral: None,
            expected_remote_static: config.expected_remote_static,
            preshared_key: config.preshared_key,
            ss,
            msg_index: 0,
        };

        // A pre-known remote key is only kept if the pattern uses it.
        let remote_pre = if hs.initiator {
            base.responder_pre_message()
        } else {
            base.initiator_pre_message()
        };
        if !remote_pre.is_empty() {
            hs.remote_static = config.remote_static;
            hs.check_pinned()?;
        }

        Ok(hs)
    }

    fn validate_config(config: &Config, protocol: &Protocol) -> Result<(), Error> {
        let base = protocol.pattern.base();

        let needs_local_static = if config.initiator {
            base.initiator_has_static()
        } else {
            base.responder_has_static()
        };
        if needs_local_static && config.local_static.is_none() {
            return Err(Error::MissingLocalStatic);
        }

        let needs_remote_static = if config.initiator {
            !base.responder_pre_message().is_empty()
        } else {
            !base.initiator_pre_message().is_empty()
        };
        if needs_remote_static && config.remote_static.is_none() {
            return Err(Error::MissingRemoteStatic);
        }

        // A pin is only meaningful if the peer's static key becomes known.
        let peer_has_static = if config.initiator {
            base.responder_has_static()
        } else {
            base.initiator_has_static()
        };
        if config.expected_remote_static.is_some() && !peer_has_static {
            return Err(Error::PeerKeyMismatch);
        }

        match (protocol.pattern.has_psk(), config.preshared_key.is_some()) {
            (true, false) => Err(Error::MissingPsk),
            (false, true) => Err(Error::UnexpectedPsk),
            _ => Ok(()),
        }
    }

    fn check_pinned(&self) -> Result<(), Error> {
        match (&self.expected_remote_static, &self.remote_static) {
            (Some(expected), Some(actual)) if expected != actual => Err(Error::PeerKeyMismatch),
            _ => Ok(()),
        }
    }

    fn is_my_turn(&self) -> bool {
        (self.msg_index % 2 == 0) == self.initiator
    }

    fn current_tokens(&self) -> Result<Vec<Token>, Error> {
        self.messages.get(self.msg_index).cloned().ok_or(Error::Finished)
    }

    fn dh(&self, local: Option<&KeyPair>, remote: Option<&Key>) -> Result<Key, Error> {
        let local = local.ok_or(Error::InvalidMessage)?;
        let remote = remote.ok_or(Error::InvalidMessage)?;
        self.protocol.dh.dh(local, remote).map_err(|_| Error::DhFailed)
    }

    /// Performs a DH token and mixes the result into the chaining key.
    fn mix_dh(&mut self, token: Token) -> Result<(), Error> {
        let (local, remote) = match (token, self.initiator) {
            (Token::EE, _) => (self.local_ephemeral.as_ref(), self.remote_ephemeral.as_ref()),
            (Token::ES, true) | (Token::SE, false) => (self.local_ephemeral.as_ref(), self.remote_static.as_ref()),
            (Token::ES, false) | (Token::SE, true) => (self.local_static.as_ref(), self.remote_ephemeral.as_ref()),
            (Token::SS, _) => (self.local_static.as_ref(), self.remote_static.as_ref()),
            _ => return Err(Error::InvalidMessage),
        };
        let shared = self.dh(local, remote)?;
        self.ss.mix_key(shared.as_bytes());
        Ok(())
    }

    fn mix_psk(&mut self) -> Result<(), Error> {
        let psk = self.preshared_key.clone().ok_or(Error::MissingPsk)?;
        self.ss.mix_key_and_hash(psk.as_bytes());
        Ok(())
    }

    /// Length of the message `tokens` produce around a payload, computed
    /// without touching any state.
    fn outgoing_len(&self, tokens: &[Token], payload_len: usize) -> usize {
        let key_len = self.protocol.dh.pub_len();
        let psk_mode = self.protocol.pattern.has_psk();
        let mut keyed = self.ss.has_key();
        let mut len = 0;
        for token in tokens {
            match token {
                Token::E => {
                    len += key_len;
                    keyed |= psk_mode;
                }
                Token::S => len += if keyed { key_len + TAG_SIZE } else { key_len },
                _ => keyed = true,
            }
        }
        len + payload_len + if keyed { TAG_SIZE } else { 0 }
    }

    /// Generates the next handshake message carrying `payload`.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let tokens = self.current_tokens()?;
        if !self.is_my_turn() {
            return Err(Error::NotOurTurn);
        }
        if self.outgoing_len(&tokens, payload.len()) > MAX_MESSAGE_SIZE {
            return Err(Error::PayloadTooLarge);
        }

        let mut msg = Vec::new();
        for token in tokens {
            match token {
                Token::E => {
                    let ephemeral = self.protocol.dh.generate();
                    msg.extend_from_slice(ephemeral.public.as_bytes());
                    self.ss.mix_hash(ephemeral.public.as_bytes());
                    if self.protocol.pattern.has_psk() {
                        self.ss.mix_key(ephemeral.public.as_bytes());
                    }
                    self.local_ephemeral = Some(ephemeral);
                }
                Token::S => {
                    let public = self
                        .local_static
                        .as_ref()
                        .map(|kp| kp.public.clone())
                        .ok_or(Error::MissingLocalStatic)?;
                    let encrypted = self.ss.encrypt_and_hash(public.as_bytes())?;
                    msg.extend_from_slice(&encrypted);
                }
                Token::Psk => self.mix_psk()?,
                dh_token => self.mix_dh(dh_token)?,
            }
        }

        let encrypted = self.ss.encrypt_and_hash(payload)?;
        msg.extend_from_slice(&encrypted);

        self.msg_index += 1;
        Ok(msg)
    }

    /// Processes a received handshake message, returning its payload.
    pub fn read_message(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let tokens = self.current_tokens()?;
        if self.is_my_turn() {
            return Err(Error::NotOurTurn);
        }
        if msg.len() > MAX_MESSAGE_SIZE {
            return Err(Error::PayloadTooLarge);
        }

        let key_len = self.protocol.dh.pub_len();
        let mut offset = 0;

        for token in tokens {
            match token {
                Token::E => {
                    let re = msg
                        .get(offset..offset + key_len)
                        .and_then(Key::from_slice)
                        .ok_or(Error::InvalidMessage)?;
                    offset += key_len;
                    self.ss.mix_hash(re.as_bytes());
                    if self.protocol.pattern.has_psk() {
                        self.ss.mix_key(re.as_bytes());
                    }
                    self.remote_ephemeral = Some(re);
                }
                Token::S => {
                    let len = if self.ss.has_key() { key_len + TAG_SIZE } else { key_len };
                    let field = msg.get(offset..offset + len).ok_or(Error::InvalidMessage)?;
                    let decrypted = self.ss.decrypt_and_hash(field)?;
                    let rs = Key::from_slice(&decrypted).ok_or(Error::InvalidMessage)?;
                    offset += len;
                    self.remote_static = Some(rs);
                    self.check_pinned()?;
                }
                Token::Psk => self.mix_psk()?,
                dh_token => self.mix_dh(dh_token)?,
            }
        }

        let payload = self.ss.decrypt_and_hash(&msg[offset..])?;

        self.msg_index += 1;
        Ok(payload)
    }

    /// Returns true if handshake is complete.
    pub fn is_finished(&self) -> bool {
        self.msg_index >= self.messages.len()
    }

    /// True if the next step is `write_message`.
    pub fn is_write_turn(&self) -> bool {
        !self.is_finished() && self.is_my_turn()
    }

    /// True if this side initiates.
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// The resolved protocol.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Returns the remote static public key, once known.
    pub fn remote_static(&self) -> Option<&Key> {
        self.remote_static.as_ref()
    }

    /// Returns the local ephemeral public key.
    /// Only valid after the 'e' token has been written.
    pub fn local_ephemeral(&self) -> Option<&Key> {
        self.local_ephemeral.as_ref().map(|kp| &kp.public)
    }

    /// Returns the handshake hash.
    pub fn hash(&self) -> &[u8] {
        self.ss.hash()
    }

    /// Consumes the finished handshake, yielding `(send, recv)` ciphers for this role.
    /// All handshake key material is dropped (and zeroized) here.
    pub fn split(self) -> Result<TransportKeys, Error> {
        if !self.is_finished() {
            return Err(Error::NotReady);
        }

        let (initiator_to_responder, responder_to_initiator) = self.ss.split();
        let (send, recv) = if self.initiator {
            (initiator_to_responder, responder_to_initiator)
        } else {
            (responder_to_initiator, initiator_to_responder)
        };
        Ok(TransportKeys {
            send,
            recv,
            remote_static: self.remote_static.clone(),
            handshake_hash: self.ss.hash().to_vec(),
        })
    }
}
