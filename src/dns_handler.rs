//! DNS Handler — turns a DNS message into a response using the caches
//! (via [`Resolver::devices_for`]) and the encoder. Built on
//! `hickory_server`'s `RequestHandler`/`MessageResponseBuilder`/UDP-TCP
//! bind-and-serve plumbing, but simplified to an authoritative-only
//! responder: no forwarder, no recursor, since this bridge only ever
//! answers for its configured domains.

use std::iter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use hickory_proto::xfer::Protocol;

use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use tracing::{error, warn};

use crate::encoder;
use crate::scheduler::Resolver;

/// Default DNS UDP payload size absent an EDNS0 advertised buffer size,
/// matching the classic DNS default of 512 bytes.
const DEFAULT_UDP_PAYLOAD_SIZE: usize = 512;

#[derive(Clone)]
pub struct DnsHandler {
    resolver: Arc<Resolver>,
}

impl DnsHandler {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub async fn serve(self, listen: SocketAddr) -> anyhow::Result<()> {
        use hickory_server::ServerFuture;
        use tokio::net::{TcpListener, UdpSocket};

        let udp_socket = UdpSocket::bind(listen).await?;
        let tcp_listener = TcpListener::bind(listen).await?;

        let mut server = ServerFuture::new(self);
        server.register_socket(udp_socket);
        server.register_listener(tcp_listener, Duration::from_secs(10));

        server.block_until_done().await?;
        Ok(())
    }

    fn set_common_flags(req: &Request, header: &mut Header, rcode: ResponseCode) {
        header.set_message_type(MessageType::Response);
        header.set_op_code(OpCode::Query);
        header.set_response_code(rcode);
        header.set_recursion_desired(req.recursion_desired());
        // The bridge never recurses or forwards.
        header.set_recursion_available(false);
        header.set_authoritative(true);
    }

    fn max_udp_payload(req: &Request) -> usize {
        req.edns()
            .map(|edns| edns.max_payload() as usize)
            .filter(|&size| size > 0)
            .unwrap_or(DEFAULT_UDP_PAYLOAD_SIZE)
    }

    /// Encodes `header` + `answers` and reports the wire size, used to
    /// decide whether a UDP response needs truncation.
    fn encoded_len(header: &Header, answers: &[Record]) -> usize {
        let mut message = Message::new();
        message.set_header(*header);
        for answer in answers {
            message.add_answer(answer.clone());
        }
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        if message.emit(&mut encoder).is_err() {
            return usize::MAX;
        }
        buf.len()
    }

    /// Truncates `answers` to fit within `max_size` bytes over UDP, setting
    /// the TC bit when anything was dropped.
    fn truncate_for_udp(header: &mut Header, mut answers: Vec<Record>, max_size: usize) -> Vec<Record> {
        if Self::encoded_len(header, &answers) <= max_size {
            return answers;
        }
        header.set_truncated(true);
        while !answers.is_empty() && Self::encoded_len(header, &answers) > max_size {
            answers.pop();
        }
        answers
    }
}

#[async_trait::async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(&self, req: &Request, mut response: R) -> ResponseInfo {
        let mut answers: Vec<Record> = Vec::new();
        let mut rcode = ResponseCode::NoError;

        for query in req.queries() {
            let domain = query.name().to_ascii();
            let domain = domain.trim_end_matches('.');
            let qtype = query.query_type();

            if !encoder::is_supported(qtype) {
                warn!(?qtype, domain, "unsupported query type requested");
                rcode = ResponseCode::NotImp;
                continue;
            }

            let devices = self.resolver.devices_for(domain).await;
            let fqdn = match Name::from_ascii(format!("{domain}.")) {
                Ok(name) => name,
                Err(_) => query.name().clone(),
            };
            answers.extend(encoder::encode_records(&fqdn, &devices, qtype));
        }

        let mut header = *req.header();
        Self::set_common_flags(req, &mut header, rcode);

        if req.protocol() == Protocol::Udp {
            let max_size = Self::max_udp_payload(req);
            answers = Self::truncate_for_udp(&mut header, answers, max_size);
        }

        let msg = MessageResponseBuilder::from_message_request(req).build(
            header,
            answers.iter(),
            iter::empty(),
            iter::empty(),
            iter::empty(),
        );

        match response.send_response(msg).await {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "error writing dns response");
                ResponseInfo::from(*req.header())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_header() -> Header {
        let mut h = Header::new();
        h.set_message_type(MessageType::Response);
        h.set_op_code(OpCode::Query);
        h
    }

    fn sample_records(n: usize) -> Vec<Record> {
        let domain = Name::from_ascii("switches.example.").unwrap();
        (0..n)
            .map(|i| {
                let mut rec = Record::new();
                rec.set_name(domain.clone());
                rec.set_ttl(30);
                rec.set_record_type(RecordType::A);
                rec.set_data(Some(hickory_proto::rr::RData::A(hickory_proto::rr::rdata::A(
                    std::net::Ipv4Addr::new(10, 0, 0, i as u8),
                ))));
                rec
            })
            .collect()
    }

    #[test]
    fn truncate_leaves_small_answer_sets_untouched() {
        let mut header = base_header();
        let answers = sample_records(2);
        let out = DnsHandler::truncate_for_udp(&mut header, answers.clone(), 4096);
        assert_eq!(out.len(), 2);
        assert!(!header.truncated());
    }

    #[test]
    fn truncate_drops_answers_and_sets_tc_bit_when_oversized() {
        let mut header = base_header();
        let answers = sample_records(200);
        let full_len = DnsHandler::encoded_len(&header, &answers);
        let out = DnsHandler::truncate_for_udp(&mut header, answers, 200);
        assert!(header.truncated());
        assert!(out.len() < 200.min(full_len));
        assert!(DnsHandler::encoded_len(&header, &out) <= 200);
    }
}
