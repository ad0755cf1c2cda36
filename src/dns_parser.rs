//! DNS message codec.
//!
//! [DnsIncoming] is the logic representation of an incoming DNS packet.
//! [DnsOutgoing] is the logic representation of an outgoing DNS message.
//! [DnsOutPacket] is the encoded packet for [DnsOutgoing].
//!
//! Both the mDNS responder and the settings server speak this format. Only
//! the header, the question section and the answer section are modelled:
//! authority and additional counts are always written as 0, and ignored
//! when reading.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::error::{decode_err, Result};
use std::{any::Any, fmt, net::Ipv4Addr, str};

/// DNS resource record types, stored as `u16`. Can do `as u16` when needed.
///
/// See [RFC 1035 section 3.2.2](https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.2)
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[non_exhaustive]
#[repr(u16)]
pub enum RRType {
    /// DNS record type for IPv4 address
    A = 1,

    /// DNS record type for Pointer
    PTR = 12,

    /// DNS record type for Text (properties)
    TXT = 16,

    /// DNS record type for Service
    SRV = 33,

    /// DNS record type for any records (wildcard)
    ANY = 255,
}

impl RRType {
    /// Converts `u16` into `RRType` if possible.
    pub const fn from_u16(value: u16) -> Option<RRType> {
        match value {
            1 => Some(RRType::A),
            12 => Some(RRType::PTR),
            16 => Some(RRType::TXT),
            33 => Some(RRType::SRV),
            255 => Some(RRType::ANY),
            _ => None,
        }
    }
}

impl fmt::Display for RRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RRType::A => write!(f, "TYPE_A"),
            RRType::PTR => write!(f, "TYPE_PTR"),
            RRType::TXT => write!(f, "TYPE_TXT"),
            RRType::SRV => write!(f, "TYPE_SRV"),
            RRType::ANY => write!(f, "TYPE_ANY"),
        }
    }
}

/// The class value for the Internet.
pub const CLASS_IN: u16 = 1;
pub const CLASS_MASK: u16 = 0x7FFF;

/// Cache-flush bit in a resource record, or the "unicast response" bit
/// in a question: the most significant bit of the class field.
pub const CLASS_CACHE_FLUSH: u16 = 0x8000;

/// Max size of UDP datagram payload.
///
/// It is calculated as: 9000 bytes - IP header 20 bytes - UDP header 8 bytes.
/// Reference: [RFC6762 section 17](https://datatracker.ietf.org/doc/html/rfc6762#section-17)
pub const MAX_MSG_ABSOLUTE: usize = 8972;

const MSG_HEADER_LEN: usize = 12;

// Definitions for DNS message header "flags" field
//
// The "flags" field is 16-bit long, in this format:
// (RFC 1035 section 4.1.1)
//
//   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
// |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//
pub const FLAGS_QR_MASK: u16 = 0x8000; // mask for query/response bit

/// Flag bit to indicate a query
pub const FLAGS_QR_QUERY: u16 = 0x0000;

/// Flag bit to indicate a response
pub const FLAGS_QR_RESPONSE: u16 = 0x8000;

/// Mask for the 4-bit Opcode.
pub const FLAGS_OPCODE_MASK: u16 = 0x7800;

/// Flag bit for Authoritative Answer
pub const FLAGS_AA: u16 = 0x0400;

/// Flag bit for Recursion Desired. Never acted on, only echoed.
pub const FLAGS_RD: u16 = 0x0100;

/// Mask for the 4-bit response code.
pub const FLAGS_RCODE_MASK: u16 = 0x000F;

/// Response code: no error.
pub const RCODE_NO_ERROR: u8 = 0;

/// Response code: the server could not answer right now.
pub const RCODE_SERVER_FAILURE: u8 = 2;

/// Response code: the queried name does not exist (NXDOMAIN).
pub const RCODE_NAME_ERROR: u8 = 3;

/// A convenience type alias for DNS record trait objects.
pub type DnsRecordBox = Box<dyn DnsRecordExt>;

impl Clone for DnsRecordBox {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

const U16_SIZE: usize = 2;

/// Max bytes in one label of a domain name.
pub(crate) const LABEL_LEN_MAX: usize = 63;

/// Max bytes of a domain name on the wire, length octets included.
const NAME_LEN_MAX: usize = 255;

/// Max bytes in one length-prefixed string of a TXT record.
const TXT_RUN_LEN_MAX: usize = 255;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DnsEntry {
    pub(crate) name: String,
    pub(crate) ty: RRType,
    class: u16,
    cache_flush: bool,
}

impl DnsEntry {
    const fn new(name: String, ty: RRType, class: u16) -> Self {
        Self {
            name,
            ty,
            class: class & CLASS_MASK,
            cache_flush: (class & CLASS_CACHE_FLUSH) != 0,
        }
    }
}

/// A DNS question entry.
///
/// The query type is kept as the raw value from the wire, so that a
/// question for a type this crate does not model can still be answered
/// with a negative response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    name: String,
    qtype: u16,
    class: u16,
    unicast_response: bool,
}

impl DnsQuestion {
    /// Creates a question of class IN.
    pub fn new(name: &str, qtype: RRType) -> Self {
        Self::from_raw(name.to_string(), qtype as u16, CLASS_IN)
    }

    fn from_raw(name: String, qtype: u16, class: u16) -> Self {
        Self {
            name,
            qtype,
            class: class & CLASS_MASK,
            unicast_response: (class & CLASS_CACHE_FLUSH) != 0,
        }
    }

    pub fn entry_name(&self) -> &str {
        &self.name
    }

    /// Returns the query type, or `None` if it is not one this crate models.
    pub fn entry_type(&self) -> Option<RRType> {
        RRType::from_u16(self.qtype)
    }

    pub fn raw_type(&self) -> u16 {
        self.qtype
    }

    pub fn class(&self) -> u16 {
        self.class
    }

    /// The mDNS "QU" bit: the querier asked for a unicast response.
    pub fn unicast_response(&self) -> bool {
        self.unicast_response
    }
}

/// A DNS Resource Record - like a DNS entry, but has a TTL.
/// RFC: https://www.rfc-editor.org/rfc/rfc1035#section-3.2.1
///      https://www.rfc-editor.org/rfc/rfc1035#section-4.1.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub(crate) entry: DnsEntry,
    ttl: u32, // in seconds, 0 means this record should not be cached
}

impl DnsRecord {
    fn new(name: &str, ty: RRType, class: u16, ttl: u32) -> Self {
        Self {
            entry: DnsEntry::new(name.to_string(), ty, class),
            ttl,
        }
    }

    pub const fn get_ttl(&self) -> u32 {
        self.ttl
    }

    pub fn get_name(&self) -> &str {
        &self.entry.name
    }
}

/// Common methods for DNS resource records.
pub trait DnsRecordExt: fmt::Debug {
    fn get_record(&self) -> &DnsRecord;
    fn write(&self, packet: &mut DnsOutPacket);
    fn any(&self) -> &dyn Any;

    /// Returns whether `other` record is considered the same, TTL included.
    fn matches(&self, other: &dyn DnsRecordExt) -> bool;

    /// Returns a human-readable string of rdata.
    fn rdata_print(&self) -> String;

    /// Returns the class only, excluding class_flush / unique bit.
    fn get_class(&self) -> u16 {
        self.get_record().entry.class
    }

    fn get_name(&self) -> &str {
        self.get_record().get_name()
    }

    fn get_type(&self) -> RRType {
        self.get_record().entry.ty
    }

    fn get_ttl(&self) -> u32 {
        self.get_record().get_ttl()
    }

    fn clone_box(&self) -> DnsRecordBox;
}

/// Resource Record for IPv4 address.
#[derive(Debug, Clone)]
pub struct DnsAddress {
    pub(crate) record: DnsRecord,
    address: Ipv4Addr,
}

impl DnsAddress {
    pub fn new(name: &str, class: u16, ttl: u32, address: Ipv4Addr) -> Self {
        let record = DnsRecord::new(name, RRType::A, class, ttl);
        Self { record, address }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }
}

impl DnsRecordExt for DnsAddress {
    fn get_record(&self) -> &DnsRecord {
        &self.record
    }

    fn write(&self, packet: &mut DnsOutPacket) {
        packet.write_bytes(self.address.octets().as_ref());
    }

    fn any(&self) -> &dyn Any {
        self
    }

    fn matches(&self, other: &dyn DnsRecordExt) -> bool {
        if let Some(other_a) = other.any().downcast_ref::<Self>() {
            return self.address == other_a.address && self.record == other_a.record;
        }
        false
    }

    fn rdata_print(&self) -> String {
        format!("{}", self.address)
    }

    fn clone_box(&self) -> DnsRecordBox {
        Box::new(self.clone())
    }
}

/// Resource Record for a DNS pointer
#[derive(Debug, Clone)]
pub struct DnsPointer {
    record: DnsRecord,
    alias: String, // the full name of Service Instance, or a host name for reverse lookup.
}

impl DnsPointer {
    pub fn new(name: &str, class: u16, ttl: u32, alias: String) -> Self {
        let record = DnsRecord::new(name, RRType::PTR, class, ttl);
        Self { record, alias }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl DnsRecordExt for DnsPointer {
    fn get_record(&self) -> &DnsRecord {
        &self.record
    }

    fn write(&self, packet: &mut DnsOutPacket) {
        packet.write_name(&self.alias);
    }

    fn any(&self) -> &dyn Any {
        self
    }

    fn matches(&self, other: &dyn DnsRecordExt) -> bool {
        if let Some(other_ptr) = other.any().downcast_ref::<Self>() {
            return self.alias == other_ptr.alias && self.record == other_ptr.record;
        }
        false
    }

    fn rdata_print(&self) -> String {
        self.alias.clone()
    }

    fn clone_box(&self) -> DnsRecordBox {
        Box::new(self.clone())
    }
}

/// Resource Record for a DNS service.
#[derive(Debug, Clone)]
pub struct DnsSrv {
    pub(crate) record: DnsRecord,
    pub(crate) priority: u16, // lower number means higher priority. Should be 0 in common cases.
    pub(crate) weight: u16,   // Should be 0 in common cases
    host: String,
    port: u16,
}

impl DnsSrv {
    pub fn new(
        name: &str,
        class: u16,
        ttl: u32,
        priority: u16,
        weight: u16,
        port: u16,
        host: String,
    ) -> Self {
        let record = DnsRecord::new(name, RRType::SRV, class, ttl);
        Self {
            record,
            priority,
            weight,
            host,
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl DnsRecordExt for DnsSrv {
    fn get_record(&self) -> &DnsRecord {
        &self.record
    }

    fn write(&self, packet: &mut DnsOutPacket) {
        packet.write_short(self.priority);
        packet.write_short(self.weight);
        packet.write_short(self.port);
        packet.write_name(&self.host);
    }

    fn any(&self) -> &dyn Any {
        self
    }

    fn matches(&self, other: &dyn DnsRecordExt) -> bool {
        if let Some(other_svc) = other.any().downcast_ref::<Self>() {
            return self.host == other_svc.host
                && self.port == other_svc.port
                && self.weight == other_svc.weight
                && self.priority == other_svc.priority
                && self.record == other_svc.record;
        }
        false
    }

    fn rdata_print(&self) -> String {
        format!(
            "priority: {}, weight: {}, port: {}, host: {}",
            self.priority, self.weight, self.port, self.host
        )
    }

    fn clone_box(&self) -> DnsRecordBox {
        Box::new(self.clone())
    }
}

/// Resource Record for a DNS TXT record.
///
/// The RDATA is a sequence of strings, each one a single length byte
/// followed by 0-255 bytes of text. The codec treats the strings as opaque:
/// a long value is split over several strings on encode, and consumers call
/// [DnsTxt::joined] to put it back together before looking for `key=value`
/// pairs.
#[derive(Clone)]
pub struct DnsTxt {
    pub(crate) record: DnsRecord,
    text: Vec<u8>,
}

impl DnsTxt {
    /// Creates a TXT record from its raw RDATA.
    pub fn new(name: &str, class: u16, ttl: u32, text: Vec<u8>) -> Self {
        let record = DnsRecord::new(name, RRType::TXT, class, ttl);
        Self { record, text }
    }

    /// Creates a TXT record with one or more strings.
    ///
    /// A string longer than 255 bytes is split into several strings.
    /// An empty list is written as one empty string.
    pub fn from_strings<S: AsRef<str>>(name: &str, class: u16, ttl: u32, strings: &[S]) -> Self {
        let mut text = Vec::new();
        for s in strings {
            for run in split_txt_runs(s.as_ref()) {
                text.push(run.len() as u8);
                text.extend_from_slice(run.as_bytes());
            }
        }
        if text.is_empty() {
            text.push(0);
        }
        Self::new(name, class, ttl, text)
    }

    /// Returns the raw RDATA.
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// Returns the strings in this record, in wire order.
    pub fn strings(&self) -> Vec<String> {
        decode_txt(&self.text)
    }

    /// Returns all strings concatenated.
    pub fn joined(&self) -> String {
        self.strings().concat()
    }
}

impl DnsRecordExt for DnsTxt {
    fn get_record(&self) -> &DnsRecord {
        &self.record
    }

    fn write(&self, packet: &mut DnsOutPacket) {
        packet.write_bytes(&self.text);
    }

    fn any(&self) -> &dyn Any {
        self
    }

    fn matches(&self, other: &dyn DnsRecordExt) -> bool {
        if let Some(other_txt) = other.any().downcast_ref::<Self>() {
            return self.text == other_txt.text && self.record == other_txt.record;
        }
        false
    }

    fn rdata_print(&self) -> String {
        format!("{:?}", self.strings())
    }

    fn clone_box(&self) -> DnsRecordBox {
        Box::new(self.clone())
    }
}

impl fmt::Debug for DnsTxt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DnsTxt {{ record: {:?}, text: {:?} }}",
            self.record,
            self.strings()
        )
    }
}

/// Splits `text` into chunks of at most 255 bytes, on char boundaries.
fn split_txt_runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut rest = text;
    while rest.len() > TXT_RUN_LEN_MAX {
        let mut cut = TXT_RUN_LEN_MAX;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        runs.push(head);
        rest = tail;
    }
    runs.push(rest);
    runs
}

// Convert from DNS TXT record content to its strings.
fn decode_txt(txt: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut offset = 0;
    while offset < txt.len() {
        let length = txt[offset] as usize;
        offset += 1; // move over the length byte

        let offset_end = offset + length;
        if offset_end > txt.len() {
            trace!("ERROR: DNS TXT: size given for string is out of range. (offset={}, length={}, offset_end={}, record length={})", offset, length, offset_end, txt.len());
            break; // Skipping the rest of the record content.
        }
        strings.push(String::from_utf8_lossy(&txt[offset..offset_end]).into_owned());
        offset = offset_end;
    }
    strings
}

/// A single packet for outgoing DNS message.
pub struct DnsOutPacket {
    /// All bytes in `data` concatenated is the actual packet on the wire.
    data: Vec<Vec<u8>>,

    /// Current logical size of the packet. It starts with the size of the mandatory header.
    size: usize,
}

impl DnsOutPacket {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            size: MSG_HEADER_LEN, // Header is mandatory.
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.concat()
    }

    /// Writes a question.
    /// Returns false if the packet exceeds the max size with this question, nothing is written to the packet.
    fn write_question(&mut self, question: &DnsQuestion) -> bool {
        let start_data_length = self.data.len();
        let start_size = self.size;

        self.write_name(&question.name);
        self.write_short(question.qtype);
        if question.unicast_response {
            self.write_short(question.class | CLASS_CACHE_FLUSH);
        } else {
            self.write_short(question.class);
        }

        if self.size > MAX_MSG_ABSOLUTE {
            self.data.truncate(start_data_length);
            self.size = start_size;
            return false;
        }

        true
    }

    /// Writes a record into the answer section.
    /// Returns false if the packet exceeds the max size with this record, nothing is written to the packet.
    /// otherwise returns true.
    fn write_record(&mut self, record_ext: &dyn DnsRecordExt) -> bool {
        let start_data_length = self.data.len();
        let start_size = self.size;

        let record = record_ext.get_record();
        self.write_name(record.get_name());
        self.write_short(record.entry.ty as u16);
        if record.entry.cache_flush {
            self.write_short(record.entry.class | CLASS_CACHE_FLUSH);
        } else {
            self.write_short(record.entry.class);
        }
        self.write_u32(record.ttl);

        let index = self.data.len();

        // Adjust size for the short we will write before this record
        self.size += 2;
        record_ext.write(self);
        self.size -= 2;

        let length: usize = self.data[index..].iter().map(|x| x.len()).sum();
        self.insert_short(index, length as u16);

        if self.size > MAX_MSG_ABSOLUTE {
            self.data.truncate(start_data_length);
            self.size = start_size;
            return false;
        }

        true
    }

    pub(crate) fn insert_short(&mut self, index: usize, value: u16) {
        self.data.insert(index, value.to_be_bytes().to_vec());
        self.size += 2;
    }

    // Write name to packet
    //
    // [RFC1035] section 3.1: a domain name is a sequence of labels, each
    // a length octet followed by that number of octets, terminated by the
    // zero length octet of the root. Names are never compressed here.
    fn write_name(&mut self, name: &str) {
        // ignore the ending "." if exists
        let name = name.strip_suffix('.').unwrap_or(name);

        for label in name.split('.').filter(|label| !label.is_empty()) {
            self.write_label(label);
        }
        self.write_byte(0);
    }

    fn write_label(&mut self, label: &str) {
        let mut end = label.len().min(LABEL_LEN_MAX);
        while !label.is_char_boundary(end) {
            end -= 1;
        }
        if end < label.len() {
            debug!("label truncated to {} bytes: {}", end, label);
        }
        self.write_byte(end as u8);
        self.write_bytes(label[..end].as_bytes());
    }

    fn write_bytes(&mut self, s: &[u8]) {
        self.data.push(s.to_vec());
        self.size += s.len();
    }

    fn write_u32(&mut self, int: u32) {
        self.data.push(int.to_be_bytes().to_vec());
        self.size += 4;
    }

    fn write_short(&mut self, short: u16) {
        self.data.push(short.to_be_bytes().to_vec());
        self.size += 2;
    }

    fn write_byte(&mut self, byte: u8) {
        self.data.push(vec![byte]);
        self.size += 1;
    }

    /// Writes the header fields and finish the packet.
    /// This function should be only called when finishing a packet.
    ///
    /// The header format is based on RFC 1035 section 4.1.1:
    /// https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
    //
    //                                  1  1  1  1  1  1
    //    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                      ID                       |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    QDCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    ANCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    NSCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //    |                    ARCOUNT                    |
    //    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    //
    fn write_header(&mut self, id: u16, flags: u16, q_count: u16, a_count: u16) {
        self.insert_short(0, 0); // additional count
        self.insert_short(0, 0); // authority count
        self.insert_short(0, a_count);
        self.insert_short(0, q_count);
        self.insert_short(0, flags);
        self.insert_short(0, id);

        // Adjust the size as it was already initialized to include the header.
        self.size -= MSG_HEADER_LEN;
    }
}

/// Representation of one outgoing DNS message.
pub struct DnsOutgoing {
    flags: u16,
    id: u16,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecordBox>,
}

impl DnsOutgoing {
    pub fn new(flags: u16) -> Self {
        Self {
            flags,
            id: 0,
            questions: Vec::new(),
            answers: Vec::new(),
        }
    }

    /// Starts an authoritative response to `query`.
    ///
    /// The transaction id, the opcode and the RD bit are echoed from the query.
    /// Questions are not copied: callers add the ones they want to echo.
    pub fn response_to(query: &DnsIncoming) -> Self {
        let echoed = query.flags() & (FLAGS_OPCODE_MASK | FLAGS_RD);
        let mut out = Self::new(FLAGS_QR_RESPONSE | FLAGS_AA | echoed);
        out.set_id(query.id());
        out
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & FLAGS_RCODE_MASK) as u8
    }

    /// Sets the 4-bit response code. Higher bits of `rcode` are ignored.
    pub fn set_rcode(&mut self, rcode: u8) {
        self.flags = (self.flags & !FLAGS_RCODE_MASK) | (u16::from(rcode) & FLAGS_RCODE_MASK);
    }

    pub const fn is_query(&self) -> bool {
        (self.flags & FLAGS_QR_MASK) == FLAGS_QR_QUERY
    }

    pub const fn is_response(&self) -> bool {
        (self.flags & FLAGS_QR_MASK) == FLAGS_QR_RESPONSE
    }

    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[DnsRecordBox] {
        &self.answers
    }

    pub fn add_question(&mut self, name: &str, qtype: RRType) {
        self.questions.push(DnsQuestion::new(name, qtype));
    }

    /// Adds a copy of `question`, e.g. to echo it in a response.
    pub fn add_question_entry(&mut self, question: &DnsQuestion) {
        self.questions.push(question.clone());
    }

    pub fn add_answer(&mut self, answer: impl DnsRecordExt + 'static) {
        trace!("add_answer push: {:?}", &answer);
        self.answers.push(Box::new(answer));
    }

    /// Encodes self into one packet. Questions and answers that do not fit
    /// into [MAX_MSG_ABSOLUTE] bytes are left out.
    pub fn to_packet(&self) -> DnsOutPacket {
        let mut packet = DnsOutPacket::new();
        let mut question_count = 0;
        let mut answer_count = 0;

        for question in self.questions.iter() {
            if !packet.write_question(question) {
                debug!(
                    "{} of {} questions fit in the packet, rest dropped",
                    question_count,
                    self.questions.len()
                );
                break;
            }
            question_count += 1;
        }

        for answer in self.answers.iter() {
            if packet.write_record(answer.as_ref()) {
                answer_count += 1;
            } else {
                debug!(
                    "answer {} {} does not fit in the packet, dropped",
                    answer.get_name(),
                    answer.get_type()
                );
            }
        }

        packet.write_header(
            self.id,
            self.flags,
            question_count,
            answer_count,
        );
        packet
    }

    /// Returns the actual DNS packet data to be sent on the wire.
    pub fn to_data_on_wire(&self) -> Vec<u8> {
        self.to_packet().to_bytes()
    }
}

/// An incoming DNS message. It could be a query or a response.
#[derive(Debug)]
pub struct DnsIncoming {
    offset: usize,
    data: Vec<u8>,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecordBox>,
    id: u16,
    flags: u16,
    num_questions: u16,
    num_answers: u16,
    num_authorities: u16,
    num_additionals: u16,
}

impl DnsIncoming {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let mut incoming = Self {
            offset: 0,
            data,
            questions: Vec::new(),
            answers: Vec::new(),
            id: 0,
            flags: 0,
            num_questions: 0,
            num_answers: 0,
            num_authorities: 0,
            num_additionals: 0,
        };

        /*
        RFC 1035 section 4.1: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1

            +---------------------+
            |        Header       |
            +---------------------+
            |       Question      | the question for the name server
            +---------------------+
            |        Answer       | RRs answering the question
            +---------------------+
            |      Authority      | not decoded
            +---------------------+
            |      Additional     | not decoded
            +---------------------+
         */
        incoming.read_header()?;
        incoming.read_questions()?;

        // Only the questions of a query are used for dispatch. Known answers
        // the querier appended may be of any shape.
        match incoming.read_rr_records(incoming.num_answers) {
            Ok(answers) => incoming.answers = answers,
            Err(e) if incoming.is_query() => {
                trace!("query {}: answer section ignored: {}", incoming.id, e);
            }
            Err(e) => return Err(e),
        }

        Ok(incoming)
    }

    /// Decodes `data` as a query that carries at least one question.
    pub fn new_query(data: Vec<u8>) -> Result<Self> {
        let msg = Self::new(data)?;
        if !msg.is_query() {
            return Err(decode_err!("message {} is not a query", msg.id));
        }
        if msg.questions.is_empty() {
            return Err(decode_err!("query {} has no questions", msg.id));
        }
        Ok(msg)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn opcode(&self) -> u8 {
        ((self.flags & FLAGS_OPCODE_MASK) >> 11) as u8
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & FLAGS_RCODE_MASK) as u8
    }

    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[DnsRecordBox] {
        &self.answers
    }

    pub fn num_questions(&self) -> u16 {
        self.num_questions
    }

    pub fn num_answers(&self) -> u16 {
        self.num_answers
    }

    pub fn num_authorities(&self) -> u16 {
        self.num_authorities
    }

    pub fn num_additionals(&self) -> u16 {
        self.num_additionals
    }

    pub const fn is_query(&self) -> bool {
        (self.flags & FLAGS_QR_MASK) == FLAGS_QR_QUERY
    }

    pub const fn is_response(&self) -> bool {
        (self.flags & FLAGS_QR_MASK) == FLAGS_QR_RESPONSE
    }

    pub const fn is_authoritative(&self) -> bool {
        (self.flags & FLAGS_AA) != 0
    }

    pub const fn recursion_desired(&self) -> bool {
        (self.flags & FLAGS_RD) != 0
    }

    fn read_header(&mut self) -> Result<()> {
        if self.data.len() < MSG_HEADER_LEN {
            return Err(decode_err!(
                "DNS incoming: header is too short: {} bytes",
                self.data.len()
            ));
        }

        let data = &self.data[0..];
        self.id = u16_from_be_slice(&data[..2]);
        self.flags = u16_from_be_slice(&data[2..4]);
        self.num_questions = u16_from_be_slice(&data[4..6]);
        self.num_answers = u16_from_be_slice(&data[6..8]);
        self.num_authorities = u16_from_be_slice(&data[8..10]);
        self.num_additionals = u16_from_be_slice(&data[10..12]);

        self.offset = MSG_HEADER_LEN;

        trace!(
            "read_header: id {}, {} questions {} answers {} authorities {} additionals",
            self.id,
            self.num_questions,
            self.num_answers,
            self.num_authorities,
            self.num_additionals
        );
        Ok(())
    }

    fn read_questions(&mut self) -> Result<()> {
        trace!("read_questions: {}", &self.num_questions);
        for i in 0..self.num_questions {
            let name = self.read_name()?;

            let data = &self.data[self.offset..];
            if data.len() < 4 {
                return Err(decode_err!(
                    "DNS incoming: question idx {} too short: {}",
                    i,
                    data.len()
                ));
            }
            let ty = u16_from_be_slice(&data[..2]);
            let class = u16_from_be_slice(&data[2..4]);
            self.offset += 4;

            self.questions.push(DnsQuestion::from_raw(name, ty, class));
        }
        Ok(())
    }

    /// Decodes a sequence of RR records.
    fn read_rr_records(&mut self, count: u16) -> Result<Vec<DnsRecordBox>> {
        trace!("read_rr_records: {}", count);
        let mut rr_records = Vec::new();

        // RFC 1035: https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.1
        //
        // All RRs have the same top level format shown below:
        //                               1  1  1  1  1  1
        // 0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // /                      NAME                     /
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                      TYPE                     |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                     CLASS                     |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                      TTL                      |
        // |                                               |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
        // |                   RDLENGTH                    |
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
        // /                     RDATA                     /
        // +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+

        // Must have at least TYPE, CLASS, TTL, RDLENGTH fields: 10 bytes.
        const RR_HEADER_REMAIN: usize = 10;

        for _ in 0..count {
            let name = self.read_name()?;
            let slice = &self.data[self.offset..];

            if slice.len() < RR_HEADER_REMAIN {
                return Err(decode_err!(
                    "read_rr_records: RR '{}' is too short after name: {} bytes",
                    &name,
                    slice.len()
                ));
            }

            let ty = u16_from_be_slice(&slice[..2]);
            let class = u16_from_be_slice(&slice[2..4]);
            let ttl = u32_from_be_slice(&slice[4..8]);
            let rdata_len = u16_from_be_slice(&slice[8..10]) as usize;
            self.offset += RR_HEADER_REMAIN;
            let next_offset = self.offset + rdata_len;

            // Sanity check for RDATA length.
            if next_offset > self.data.len() {
                return Err(decode_err!(
                    "RR {name} RDATA length {rdata_len} is invalid: remain data len: {}",
                    self.data.len() - self.offset
                ));
            }

            // decode RDATA based on the record type.
            let rec: Option<DnsRecordBox> = match RRType::from_u16(ty) {
                Some(RRType::A) => {
                    if rdata_len != 4 {
                        return Err(decode_err!(
                            "RR {name} type A has RDATA length {rdata_len}"
                        ));
                    }
                    Some(Box::new(DnsAddress::new(
                        &name,
                        class,
                        ttl,
                        self.read_ipv4()?,
                    )))
                }
                Some(RRType::PTR) => Some(Box::new(DnsPointer::new(
                    &name,
                    class,
                    ttl,
                    self.read_name()?,
                ))),
                Some(RRType::TXT) => Some(Box::new(DnsTxt::new(
                    &name,
                    class,
                    ttl,
                    self.read_vec(rdata_len)?,
                ))),
                Some(RRType::SRV) => Some(Box::new(DnsSrv::new(
                    &name,
                    class,
                    ttl,
                    self.read_u16()?,
                    self.read_u16()?,
                    self.read_u16()?,
                    self.read_name()?,
                ))),
                Some(RRType::ANY) | None => None,
            };

            if let Some(record) = rec {
                trace!(
                    "read_rr_records: {} {} {}",
                    record.get_type(),
                    record.get_name(),
                    record.rdata_print()
                );
                rr_records.push(record);
            } else {
                trace!("Unsupported DNS record type: {} name: {}", ty, &name);
                self.offset = next_offset;
            }

            // sanity check.
            if self.offset != next_offset {
                return Err(decode_err!(
                    "read_rr_records: decode offset error for RData type {} offset: {} expected offset: {}",
                    ty, self.offset, next_offset,
                ));
            }
        }

        Ok(rr_records)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let slice = &self.data[self.offset..];
        if slice.len() < U16_SIZE {
            return Err(decode_err!("read_u16: slice len is only {}", slice.len()));
        }
        let num = u16_from_be_slice(&slice[..U16_SIZE]);
        self.offset += U16_SIZE;
        Ok(num)
    }

    fn read_vec(&mut self, length: usize) -> Result<Vec<u8>> {
        let end = self.offset + length;
        if end > self.data.len() {
            return Err(decode_err!(
                "read_vec: {} bytes at offset {} exceeds data length {}",
                length,
                self.offset,
                self.data.len()
            ));
        }
        let v = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(v)
    }

    fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        let v = self.read_vec(4)?;
        Ok(Ipv4Addr::new(v[0], v[1], v[2], v[3]))
    }

    /// Reads a domain name at the current location of `self.data`.
    ///
    /// See https://datatracker.ietf.org/doc/html/rfc1035#section-3.1 for
    /// domain name encoding.
    fn read_name(&mut self) -> Result<String> {
        let data = &self.data[..];
        let start_offset = self.offset;
        let mut offset = start_offset;
        let mut name = "".to_string();
        let mut at_end = false;

        // Wire length of the decoded name, starting with the root octet.
        let mut wire_len = 1;

        // Every pointer must jump strictly before the start of the labels
        // being read, so the walk always terminates.
        let mut segment_start = start_offset;

        // From RFC1035:
        // "...The compression scheme allows a domain name in a message to be
        // represented as either:
        // - a sequence of labels ending in a zero octet
        // - a pointer
        // - a sequence of labels ending with a pointer"
        loop {
            if offset >= data.len() {
                return Err(decode_err!(
                    "read_name: offset: {} data len {}",
                    offset,
                    data.len()
                ));
            }
            let length = data[offset];

            // From RFC1035:
            // "...Since every domain name ends with the null label of
            // the root, a domain name is terminated by a length byte of zero."
            if length == 0 {
                if !at_end {
                    self.offset = offset + 1;
                }
                break; // The end of the name
            }

            // Check the first 2 bits for possible "Message compression".
            match length & 0xC0 {
                0x00 => {
                    // regular utf8 string with length
                    offset += 1;
                    let ending = offset + length as usize;

                    // Never read beyond the whole data length.
                    if ending > data.len() {
                        return Err(decode_err!(
                            "read_name: ending {} exceeds data length {}",
                            ending,
                            data.len()
                        ));
                    }

                    wire_len += 1 + length as usize;
                    if wire_len > NAME_LEN_MAX {
                        return Err(decode_err!(
                            "read_name: name longer than {} bytes at offset {}",
                            NAME_LEN_MAX,
                            offset
                        ));
                    }

                    name += str::from_utf8(&data[offset..ending])
                        .map_err(|e| decode_err!("read_name: from_utf8: {}", e))?;
                    name += ".";
                    offset += length as usize;
                }
                0xC0 => {
                    // Message compression.
                    // See https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
                    let slice = &data[offset..];
                    if slice.len() < U16_SIZE {
                        return Err(decode_err!(
                            "read_name: u16 slice len is only {}",
                            slice.len()
                        ));
                    }
                    let pointer = (u16_from_be_slice(slice) ^ 0xC000) as usize;
                    if pointer >= segment_start {
                        // Error: could trigger an infinite loop.
                        return Err(decode_err!(
                            "Invalid name compression: pointer {} must be less than {}",
                            &pointer,
                            &segment_start
                        ));
                    }

                    // A pointer marks the end of a domain name.
                    if !at_end {
                        self.offset = offset + U16_SIZE;
                        at_end = true;
                    }
                    segment_start = pointer;
                    offset = pointer;
                }
                _ => {
                    return Err(decode_err!(
                        "Bad name with invalid length: 0x{:x} offset {}",
                        length,
                        offset
                    ));
                }
            };
        }

        Ok(name)
    }
}

/// Case-insensitive name comparison, ignoring a trailing dot.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    let a = a.strip_suffix('.').unwrap_or(a);
    let b = b.strip_suffix('.').unwrap_or(b);
    a.eq_ignore_ascii_case(b)
}

const fn u16_from_be_slice(bytes: &[u8]) -> u16 {
    let u8_array: [u8; 2] = [bytes[0], bytes[1]];
    u16::from_be_bytes(u8_array)
}

const fn u32_from_be_slice(s: &[u8]) -> u32 {
    let u8_array: [u8; 4] = [s[0], s[1], s[2], s[3]];
    u32::from_be_bytes(u8_array)
}

#[cfg(test)]
mod tests {
    use super::{
        DnsAddress, DnsIncoming, DnsOutgoing, DnsPointer, DnsQuestion, DnsRecordExt, DnsSrv,
        DnsTxt, RRType, CLASS_CACHE_FLUSH, CLASS_IN, FLAGS_AA, FLAGS_QR_QUERY, FLAGS_QR_RESPONSE,
        FLAGS_RD, MAX_MSG_ABSOLUTE, RCODE_NAME_ERROR, RCODE_SERVER_FAILURE,
    };
    use crate::error::Error;
    use std::net::Ipv4Addr;
    use test_log::test;

    const SERVICE: &str = "_audiosink._udp.local.";
    const INSTANCE: &str = "kitchen._audiosink._udp.local.";
    const HOST: &str = "audiosink.local.";

    /// A query header with `qdcount` questions and `ancount` answers.
    fn query_header(id: u16, qdcount: u16, ancount: u16) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&id.to_be_bytes());
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&qdcount.to_be_bytes());
        data.extend_from_slice(&ancount.to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0]);
        data
    }

    #[test]
    fn test_response_round_trip() {
        let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA | FLAGS_RD);
        out.set_id(0xBEEF);
        out.set_rcode(RCODE_SERVER_FAILURE);
        out.add_question(SERVICE, RRType::ANY);
        out.add_answer(DnsAddress::new(
            HOST,
            CLASS_IN,
            3600,
            Ipv4Addr::new(192, 168, 1, 20),
        ));
        out.add_answer(DnsPointer::new(SERVICE, CLASS_IN, 3600, INSTANCE.to_string()));
        out.add_answer(DnsSrv::new(INSTANCE, CLASS_IN, 3600, 0, 0, 8010, HOST.to_string()));
        out.add_answer(DnsTxt::from_strings(
            INSTANCE,
            CLASS_IN,
            3600,
            &["type=sink", "receiver_id=abc"],
        ));

        let msg = DnsIncoming::new(out.to_data_on_wire()).unwrap();
        assert_eq!(msg.id(), 0xBEEF);
        assert!(msg.is_response());
        assert!(msg.is_authoritative());
        assert!(msg.recursion_desired());
        assert_eq!(msg.rcode(), RCODE_SERVER_FAILURE);
        assert_eq!(msg.opcode(), 0);
        assert_eq!(msg.questions(), out.questions());
        assert_eq!(msg.answers().len(), 4);
        for (decoded, original) in msg.answers().iter().zip(out.answers()) {
            assert!(decoded.matches(original.as_ref()), "{:?}", decoded);
        }

        let txt = msg.answers()[3].any().downcast_ref::<DnsTxt>().unwrap();
        assert_eq!(txt.strings(), vec!["type=sink", "receiver_id=abc"]);
        assert_eq!(txt.get_ttl(), 3600);
    }

    #[test]
    fn test_query_round_trip_keeps_opcode_and_unknown_type() {
        // Opcode 2 (STATUS) and a question type this crate does not model (AAAA).
        let mut data = query_header(7, 1, 0);
        data[2] = 0x10 | 0x01; // opcode 2, RD
        data.extend_from_slice(b"\x09audiosink\x05local\x00");
        data.extend_from_slice(&28u16.to_be_bytes());
        data.extend_from_slice(&(CLASS_IN | CLASS_CACHE_FLUSH).to_be_bytes());

        let query = DnsIncoming::new_query(data).unwrap();
        assert_eq!(query.opcode(), 2);
        let question = &query.questions()[0];
        assert_eq!(question.entry_name(), HOST);
        assert_eq!(question.entry_type(), None);
        assert_eq!(question.raw_type(), 28);
        assert_eq!(question.class(), CLASS_IN);
        assert!(question.unicast_response());

        let mut out = DnsOutgoing::response_to(&query);
        out.add_question_entry(question);
        out.set_rcode(RCODE_NAME_ERROR);

        let response = DnsIncoming::new(out.to_data_on_wire()).unwrap();
        assert_eq!(response.id(), 7);
        assert_eq!(response.opcode(), 2);
        assert!(response.recursion_desired());
        assert_eq!(response.rcode(), RCODE_NAME_ERROR);
        assert_eq!(response.questions(), query.questions());
    }

    #[test]
    fn test_short_buffers_are_rejected() {
        let full = query_header(1, 0, 0);
        for len in 0..full.len() {
            match DnsIncoming::new(full[..len].to_vec()) {
                Err(Error::Decode(_)) => {}
                other => panic!("len {}: unexpected {:?}", len, other),
            }
        }
        assert!(DnsIncoming::new(full).is_ok());
    }

    #[test]
    fn test_new_query_requires_questions() {
        assert!(matches!(
            DnsIncoming::new_query(query_header(1, 0, 0)),
            Err(Error::Decode(_))
        ));

        let mut response = DnsOutgoing::new(FLAGS_QR_RESPONSE);
        response.add_question(SERVICE, RRType::PTR);
        assert!(matches!(
            DnsIncoming::new_query(response.to_data_on_wire()),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_compressed_question_name() {
        let mut data = query_header(0x42, 2, 0);
        data.extend_from_slice(b"\x09audiosink\x05local\x00");
        data.extend_from_slice(&[0, 12, 0, 1]); // PTR, IN
        data.extend_from_slice(b"\x04_foo\xC0\x0C"); // pointer to offset 12
        data.extend_from_slice(&[0, 16, 0, 1]); // TXT, IN

        let msg = DnsIncoming::new_query(data).unwrap();
        assert_eq!(msg.questions().len(), 2);
        assert_eq!(msg.questions()[1].entry_name(), "_foo.audiosink.local.");
        assert_eq!(msg.questions()[1].entry_type(), Some(RRType::TXT));
    }

    #[test]
    fn test_compression_loop_is_rejected() {
        let mut data = query_header(1, 1, 0);
        data.extend_from_slice(b"\xC0\x0C"); // points to itself
        data.extend_from_slice(&[0, 1, 0, 1]);
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_truncated_label_is_rejected() {
        let mut data = query_header(1, 1, 0);
        data.extend_from_slice(b"\x09audio"); // claims 9 bytes, has 5
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));

        let mut data = query_header(1, 1, 0);
        data.extend_from_slice(b"\x05local\x00\x00"); // qtype only, no qclass
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_query_with_garbage_answers_still_decodes() {
        let mut data = query_header(9, 1, 3);
        data.extend_from_slice(b"\x09audiosink\x05local\x00");
        data.extend_from_slice(&[0, 1, 0, 1]);
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF]); // not a record

        let msg = DnsIncoming::new_query(data.clone()).unwrap();
        assert_eq!(msg.questions().len(), 1);
        assert!(msg.answers().is_empty());

        // The same bytes as a response are an error.
        data[2] = 0x80;
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_unknown_answer_type_is_skipped() {
        let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE);
        out.add_answer(DnsAddress::new(HOST, CLASS_IN, 120, Ipv4Addr::LOCALHOST));
        let mut data = out.to_data_on_wire();

        // Append an AAAA record and bump the answer count.
        data[7] = 2;
        data.extend_from_slice(b"\x09audiosink\x05local\x00");
        data.extend_from_slice(&[0, 28, 0, 1, 0, 0, 0, 120, 0, 16]);
        data.extend_from_slice(&[0u8; 16]);

        let msg = DnsIncoming::new(data).unwrap();
        assert_eq!(msg.num_answers(), 2);
        assert_eq!(msg.answers().len(), 1);
        assert_eq!(msg.answers()[0].get_type(), RRType::A);
    }

    #[test]
    fn test_a_record_with_bad_length_is_rejected() {
        let mut data = query_header(1, 0, 1);
        data[2] = 0x80;
        data.extend_from_slice(b"\x05local\x00");
        data.extend_from_slice(&[0, 1, 0, 1, 0, 0, 0, 120, 0, 2, 10, 0]);
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_long_txt_is_split_and_joined() {
        let long = "x".repeat(600);
        let txt = DnsTxt::from_strings(INSTANCE, CLASS_IN, 60, &[long.as_str()]);
        let strings = txt.strings();
        assert_eq!(
            strings.iter().map(|s| s.len()).collect::<Vec<_>>(),
            vec![255, 255, 90]
        );
        assert_eq!(txt.joined(), long);
    }

    #[test]
    fn test_long_label_is_truncated() {
        let label = "a".repeat(70);
        let mut out = DnsOutgoing::new(FLAGS_QR_QUERY);
        out.add_question(&format!("{}.local.", label), RRType::A);

        let msg = DnsIncoming::new(out.to_data_on_wire()).unwrap();
        assert_eq!(
            msg.questions()[0].entry_name(),
            format!("{}.local.", &label[..63])
        );
    }

    #[test]
    fn test_questions_beyond_max_size_are_dropped() {
        // 245 bytes on the wire, 249 with type and class.
        let name = format!("{0}.{0}.{0}.{0}.", "a".repeat(60));
        let mut out = DnsOutgoing::new(FLAGS_QR_RESPONSE | FLAGS_AA);
        for _ in 0..100 {
            out.add_question(&name, RRType::TXT);
        }
        out.add_answer(DnsAddress::new(HOST, CLASS_IN, 120, Ipv4Addr::LOCALHOST));

        let data = out.to_data_on_wire();
        assert!(data.len() <= MAX_MSG_ABSOLUTE);

        // The question count matches what was written, and the answer still fits.
        let msg = DnsIncoming::new(data).unwrap();
        assert_eq!(msg.questions().len(), (MAX_MSG_ABSOLUTE - 12) / 249);
        assert_eq!(msg.answers().len(), 1);
    }

    #[test]
    fn test_name_longer_than_255_bytes_is_rejected() {
        // Five 63-byte labels: 321 bytes on the wire.
        let mut data = query_header(1, 1, 0);
        for _ in 0..5 {
            data.push(63);
            data.extend_from_slice(&[b'a'; 63]);
        }
        data.push(0);
        data.extend_from_slice(&[0, 16, 0, 1]);
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));

        // Four 60-byte labels are fine on their own.
        let mut data = query_header(1, 1, 0);
        for _ in 0..4 {
            data.push(60);
            data.extend_from_slice(&[b'a'; 60]);
        }
        data.push(0);
        data.extend_from_slice(&[0, 16, 0, 1]);
        let msg = DnsIncoming::new(data.clone()).unwrap();
        assert_eq!(msg.questions()[0].entry_name().len(), 244);

        // A label in front of a pointer to them is too long.
        data[5] = 2;
        data.push(20);
        data.extend_from_slice(&[b'b'; 20]);
        data.extend_from_slice(b"\xC0\x0C");
        data.extend_from_slice(&[0, 16, 0, 1]);
        assert!(matches!(DnsIncoming::new(data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_question_new() {
        let q = DnsQuestion::new(HOST, RRType::A);
        assert_eq!(q.entry_type(), Some(RRType::A));
        assert_eq!(q.class(), CLASS_IN);
        assert!(!q.unicast_response());
    }
}
