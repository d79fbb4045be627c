// # DNS Public IP Fetcher
//
// This crate discovers the public IP address by asking resolvers that echo
// the client address back:
//
// - Cloudflare: `whoami.cloudflare.` TXT in the CHAOS class
// - OpenDNS: `myip.opendns.com.` A / AAAA in the IN class
//
// ## Architecture
//
// Queries are plain DNS over UDP port 53, built with `hickory-proto`: a stub
// resolver cannot send CHAOS class queries. IPv4 lookups go to the
// provider's IPv4 server and IPv6 lookups to its IPv6 server, so the answer
// is the address of the matching family. Providers are cycled on each call.

use ddns_core::config::Settings;
use ddns_core::publicip::Ring;
use ddns_core::traits::PublicIpFetcher;
use ddns_core::{Error, Result};

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest UDP DNS answer we accept.
const MAX_ANSWER_SIZE: usize = 4096;

/// Resolvers echoing the client address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsProvider {
    Cloudflare,
    OpenDns,
}

impl DnsProvider {
    /// Every known provider
    pub const ALL: [DnsProvider; 2] = [DnsProvider::Cloudflare, DnsProvider::OpenDns];

    fn query_name(&self) -> &'static str {
        match self {
            DnsProvider::Cloudflare => "whoami.cloudflare.",
            DnsProvider::OpenDns => "myip.opendns.com.",
        }
    }

    fn class(&self) -> DNSClass {
        match self {
            DnsProvider::Cloudflare => DNSClass::CH,
            DnsProvider::OpenDns => DNSClass::IN,
        }
    }

    fn record_type(&self, family: Family) -> RecordType {
        match (self, family) {
            (DnsProvider::Cloudflare, _) => RecordType::TXT,
            (DnsProvider::OpenDns, Family::V6) => RecordType::AAAA,
            (DnsProvider::OpenDns, _) => RecordType::A,
        }
    }

    fn server(&self, family: Family) -> SocketAddr {
        let ip = match (self, family) {
            (DnsProvider::Cloudflare, Family::V6) => {
                IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111))
            }
            (DnsProvider::Cloudflare, _) => IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            (DnsProvider::OpenDns, Family::V6) => {
                IpAddr::V6(Ipv6Addr::new(0x2620, 0x119, 0x35, 0, 0, 0, 0, 0x35))
            }
            (DnsProvider::OpenDns, _) => IpAddr::V4(Ipv4Addr::new(208, 67, 222, 222)),
        };
        SocketAddr::new(ip, 53)
    }
}

impl fmt::Display for DnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DnsProvider::Cloudflare => "cloudflare",
            DnsProvider::OpenDns => "opendns",
        })
    }
}

impl FromStr for DnsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cloudflare" => Ok(DnsProvider::Cloudflare),
            "opendns" => Ok(DnsProvider::OpenDns),
            _ => Err(Error::config(format!("unknown public IP echo DNS provider: {s}"))),
        }
    }
}

/// Address family a lookup asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Any,
    V4,
    V6,
}

/// Public IP fetcher backed by DNS echo queries
pub struct DnsFetcher {
    providers: Ring<DnsProvider>,
    timeout: Duration,
    server: Option<SocketAddr>,
}

impl DnsFetcher {
    /// Create a fetcher cycling over `providers`
    pub fn new(providers: Vec<DnsProvider>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            providers: Ring::new(providers)?,
            timeout,
            server: None,
        })
    }

    /// Create a fetcher from `PUBLICIP_DNS_PROVIDERS` and `PUBLICIP_DNS_TIMEOUT`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut providers: Vec<DnsProvider> = Vec::new();
        for name in &settings.public_ip.dns_providers {
            let named = if name == "all" {
                DnsProvider::ALL.to_vec()
            } else {
                vec![name.parse()?]
            };
            for provider in named {
                if !providers.contains(&provider) {
                    providers.push(provider);
                }
            }
        }
        Self::new(providers, settings.public_ip.dns_timeout)
    }

    /// Send every query to `server` instead of the provider's resolvers
    pub fn with_server(mut self, server: SocketAddr) -> Self {
        self.server = Some(server);
        self
    }

    async fn lookup(&self, family: Family) -> Result<Vec<IpAddr>> {
        let provider = *self.providers.next();
        let server = self.server.unwrap_or_else(|| provider.server(family));
        let record_type = provider.record_type(family);

        let name = Name::from_ascii(provider.query_name())
            .map_err(|e| Error::public_ip(format!("{provider}: invalid query name: {e}")))?;
        let mut query = Query::query(name, record_type);
        query.set_query_class(provider.class());

        let mut message = Message::new();
        message
            .set_id(rand::random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(query);

        tracing::debug!("Querying {} {} at {}", provider, record_type, server);
        let answer = tokio::time::timeout(self.timeout, exchange(&message, server))
            .await
            .map_err(|_| {
                Error::public_ip(format!("{provider}: no answer from {server} after {:?}", self.timeout))
            })?
            .map_err(|e| Error::public_ip(format!("{provider}: {e}")))?;

        if answer.id() != message.id() {
            return Err(Error::public_ip(format!(
                "{provider}: answer id {} does not match query id {}",
                answer.id(),
                message.id()
            )));
        }
        parse_answers(&answer).map_err(|e| Error::public_ip(format!("{provider}: {e}")))
    }
}

async fn exchange(message: &Message, server: SocketAddr) -> Result<Message> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;

    let query = message
        .to_vec()
        .map_err(|e| Error::public_ip(format!("encoding query: {e}")))?;
    socket.send(&query).await?;

    let mut buffer = vec![0u8; MAX_ANSWER_SIZE];
    let size = socket.recv(&mut buffer).await?;
    Message::from_vec(&buffer[..size]).map_err(|e| Error::public_ip(format!("decoding answer: {e}")))
}

/// IP addresses carried by the answer section.
///
/// TXT records must hold exactly one string, the IP address.
fn parse_answers(answer: &Message) -> Result<Vec<IpAddr>> {
    if answer.answers().is_empty() {
        return Err(Error::no_ip("response answer not received"));
    }

    let mut ips = Vec::with_capacity(answer.answers().len());
    for record in answer.answers() {
        let ip = match record.data() {
            RData::A(a) => IpAddr::V4(a.0),
            RData::AAAA(aaaa) => IpAddr::V6(aaaa.0),
            RData::TXT(txt) => {
                let [data] = txt.txt_data() else {
                    return Err(Error::unknown_response(format!(
                        "{} TXT strings instead of 1",
                        txt.txt_data().len()
                    )));
                };
                let text = String::from_utf8_lossy(data);
                text.trim()
                    .parse()
                    .map_err(|_| Error::unknown_response(format!("IP address malformed: {text}")))?
            }
            other => {
                return Err(Error::unknown_response(format!(
                    "answer type {} not supported",
                    other.record_type()
                )));
            }
        };
        ips.push(ip);
    }
    Ok(ips)
}

#[async_trait::async_trait]
impl PublicIpFetcher for DnsFetcher {
    async fn ip(&self) -> Result<IpAddr> {
        let ips = self.lookup(Family::Any).await?;
        ips.first()
            .copied()
            .ok_or_else(|| Error::no_ip("empty answer"))
    }

    async fn ip4(&self) -> Result<IpAddr> {
        let ips = self.lookup(Family::V4).await?;
        ips.into_iter()
            .find(IpAddr::is_ipv4)
            .ok_or_else(|| Error::no_ip("IP addresses found but not for IPv4"))
    }

    async fn ip6(&self) -> Result<IpAddr> {
        let ips = self.lookup(Family::V6).await?;
        ips.into_iter()
            .find(IpAddr::is_ipv6)
            .ok_or_else(|| Error::no_ip("IP addresses found but not for IPv6"))
    }
}
