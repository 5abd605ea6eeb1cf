use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use remote_display_common::IceCandidate;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::state::{ConnectionState, Role};
use super::transport::PeerTransport;
use crate::registry::MediaStream;

/// One negotiation attempt and everything it owns.
///
/// Candidate logs are append-only. Remote candidates that arrive before the
/// remote description are parked in `pending_remote` and released FIFO.
pub(crate) struct Session {
    pub id: Uuid,
    pub generation: u64,
    pub role: Role,
    pub state: ConnectionState,
    pub transport: Option<Arc<dyn PeerTransport>>,
    pub local_candidates: Vec<IceCandidate>,
    pub remote_candidates: Vec<IceCandidate>,
    pub pending_remote: VecDeque<IceCandidate>,
    pub local_description_sent: bool,
    /// An apply of the remote description is in flight or done.
    pub remote_description_requested: bool,
    pub remote_description_set: bool,
    pub stream: Option<MediaStream>,
    /// Cleared synchronously on teardown; transport callbacks check it before emitting.
    pub live: Arc<AtomicBool>,
    pub candidate_tx: Option<mpsc::UnboundedSender<IceCandidate>>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(generation: u64, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            role,
            state: ConnectionState::Negotiating,
            transport: None,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            pending_remote: VecDeque::new(),
            local_description_sent: false,
            remote_description_requested: false,
            remote_description_set: false,
            stream: None,
            live: Arc::new(AtomicBool::new(true)),
            candidate_tx: None,
            tasks: Vec::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Accept a remote candidate: forward it now, or park it until the
    /// remote description is installed.
    pub fn receive_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.remote_description_set {
            self.forward_remote(candidate);
        } else {
            self.pending_remote.push_back(candidate);
        }
    }

    /// Mark the remote description installed and release parked candidates in order.
    pub fn remote_description_applied(&mut self) -> usize {
        self.remote_description_set = true;
        let pending: Vec<IceCandidate> = self.pending_remote.drain(..).collect();
        let released = pending.len();
        for candidate in pending {
            self.forward_remote(candidate);
        }
        released
    }

    fn forward_remote(&mut self, candidate: IceCandidate) {
        self.remote_candidates.push(candidate.clone());
        if let Some(tx) = &self.candidate_tx {
            let _ = tx.send(candidate);
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            role: self.role,
            state: self.state,
            local_candidates: self.local_candidates.len(),
            remote_candidates: self.remote_candidates.len(),
            pending_remote_candidates: self.pending_remote.len(),
            remote_description_set: self.remote_description_set,
            stream_published: self.stream.is_some(),
        }
    }

    /// Stop emitting, drop the candidate queue and cancel in-flight work.
    /// Returns the transport so the caller can close it.
    pub fn dismantle(&mut self) -> Option<Arc<dyn PeerTransport>> {
        self.live.store(false, Ordering::SeqCst);
        self.candidate_tx = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.pending_remote.clear();
        self.stream = None;
        self.transport.take()
    }
}

/// Read-only snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub role: Role,
    pub state: ConnectionState,
    pub local_candidates: usize,
    pub remote_candidates: usize,
    pub pending_remote_candidates: usize,
    pub remote_description_set: bool,
    pub stream_published: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidate(n: usize) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    #[test]
    fn test_candidates_parked_until_description() {
        let mut session = Session::new(1, Role::Answerer);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.candidate_tx = Some(tx);

        session.receive_remote_candidate(candidate(1));
        session.receive_remote_candidate(candidate(2));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.info().pending_remote_candidates, 2);

        assert_eq!(session.remote_description_applied(), 2);
        session.receive_remote_candidate(candidate(3));

        let applied: Vec<IceCandidate> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(applied, vec![candidate(1), candidate(2), candidate(3)]);
        assert_eq!(session.remote_candidates.len(), 3);
    }

    #[test]
    fn test_dismantle_stops_forwarding() {
        let mut session = Session::new(1, Role::Offerer);
        let (tx, mut rx) = mpsc::unbounded_channel();
        session.candidate_tx = Some(tx);
        session.receive_remote_candidate(candidate(1));

        assert!(session.dismantle().is_none());
        assert!(!session.is_live());
        session.remote_description_applied();
        session.receive_remote_candidate(candidate(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_info_serializes_for_logs() {
        let mut session = Session::new(4, Role::Offerer);
        session.state = ConnectionState::Negotiating;
        session.receive_remote_candidate(candidate(1));

        let json = serde_json::to_value(session.info()).unwrap();
        assert_eq!(json["role"], "offerer");
        assert_eq!(json["state"], "negotiating");
        assert_eq!(json["pending_remote_candidates"], 1);
        assert_eq!(json["remote_description_set"], false);
        assert_eq!(json["id"], session.id.to_string());
    }

    proptest! {
        #[test]
        fn prop_parked_candidates_release_in_receipt_order(
            before in 0usize..40,
            after in 0usize..10,
        ) {
            let mut session = Session::new(1, Role::Answerer);
            let (tx, mut rx) = mpsc::unbounded_channel();
            session.candidate_tx = Some(tx);

            for n in 0..before {
                session.receive_remote_candidate(candidate(n));
            }
            prop_assert_eq!(session.remote_description_applied(), before);
            for n in before..before + after {
                session.receive_remote_candidate(candidate(n));
            }

            let applied: Vec<IceCandidate> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
            let expected: Vec<IceCandidate> = (0..before + after).map(candidate).collect();
            prop_assert_eq!(applied, expected);
        }
    }
}
