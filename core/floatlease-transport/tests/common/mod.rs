//! Shared test helpers: a scripted license server.

#![allow(dead_code)]

use floatlease_transport::codec::{read_frame, write_frame};
use floatlease_transport::{LeaseRequest, LeaseResponse};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};

/// How the scripted server treats a connection after answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    /// Keep serving requests on the same connection.
    KeepAlive,
    /// Close the connection after one response.
    CloseAfterReply,
    /// Read requests but never answer.
    Silent,
}

/// A license server that answers with queued responses (OK once the queue is empty).
pub struct ScriptedServer {
    pub addr: SocketAddr,
    responses: Arc<Mutex<VecDeque<LeaseResponse>>>,
    requests: Arc<Mutex<Vec<LeaseRequest>>>,
    accepts: Arc<AtomicUsize>,
}

impl ScriptedServer {
    pub async fn start(mode: ConnMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let responses = Arc::new(Mutex::new(VecDeque::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let accepts = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            responses: responses.clone(),
            requests: requests.clone(),
            accepts: accepts.clone(),
        };

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accepts.fetch_add(1, Ordering::SeqCst);
                let responses = responses.clone();
                let requests = requests.clone();
                tokio::spawn(serve(stream, mode, responses, requests));
            }
        });

        server
    }

    pub fn respond_with(&self, response: LeaseResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<LeaseRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn serve(
    mut stream: TcpStream,
    mode: ConnMode,
    responses: Arc<Mutex<VecDeque<LeaseResponse>>>,
    requests: Arc<Mutex<Vec<LeaseRequest>>>,
) {
    loop {
        let request: LeaseRequest = match read_frame(&mut stream).await {
            Ok(request) => request,
            Err(_) => return,
        };
        requests.lock().unwrap().push(request);

        if mode == ConnMode::Silent {
            continue;
        }

        let response = responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(LeaseResponse::ok);
        if write_frame(&mut stream, &response).await.is_err() {
            return;
        }

        if mode == ConnMode::CloseAfterReply {
            return;
        }
    }
}
