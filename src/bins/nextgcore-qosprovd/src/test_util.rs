//! In-process PCRF stand-in and deterministic randomness for unit tests

use std::collections::VecDeque;

use async_trait::async_trait;
use ogs_diameter::{
    avp_code, Avp, AvpValue, DiameterError, DiameterMessage, DiameterResult, PeerConnection,
};

use crate::ccr_build::{CcrBuilder, CcrSettings, RandomSource};
use crate::context::QosprovConfig;

/// Counts up from a seed
pub(crate) struct StepRandom {
    next: u32,
}

impl StepRandom {
    pub(crate) fn new(seed: u32) -> Self {
        Self { next: seed }
    }
}

impl RandomSource for StepRandom {
    fn next_u32(&mut self) -> u32 {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        value
    }
}

/// Builder over the default configuration
pub(crate) fn builder(seed: u32) -> CcrBuilder<StepRandom> {
    CcrBuilder::new(
        CcrSettings::from(&QosprovConfig::default()),
        StepRandom::new(seed),
    )
}

/// CCA echoing the request's Session-Id
pub(crate) fn cca(request: &DiameterMessage, result_code: u32) -> DiameterMessage {
    let mut answer = DiameterMessage::new_answer(request);
    if let Some(sid) = request.session_id() {
        answer.add_avp(Avp::mandatory(
            avp_code::SESSION_ID,
            AvpValue::Utf8String(sid.to_string()),
        ));
    }
    answer.add_avp(Avp::mandatory(
        avp_code::RESULT_CODE,
        AvpValue::Unsigned32(result_code),
    ));
    answer
}

/// One scripted reaction to a request
pub(crate) enum Reply {
    ResultCode(u32),
    Message(Box<dyn FnOnce(&DiameterMessage) -> DiameterMessage + Send>),
    Fail(DiameterError),
}

/// Peer connection answering from a script, recording every request sent
#[derive(Default)]
pub(crate) struct MockPcrf {
    script: VecDeque<Reply>,
    pub(crate) requests: Vec<DiameterMessage>,
    pub(crate) closed: bool,
}

impl MockPcrf {
    pub(crate) fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerConnection for MockPcrf {
    async fn send_request(&mut self, request: DiameterMessage) -> DiameterResult<DiameterMessage> {
        self.requests.push(request.clone());
        match self.script.pop_front() {
            Some(Reply::ResultCode(code)) => Ok(cca(&request, code)),
            Some(Reply::Message(make)) => Ok(make(&request)),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(DiameterError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> DiameterResult<()> {
        self.closed = true;
        Ok(())
    }
}
