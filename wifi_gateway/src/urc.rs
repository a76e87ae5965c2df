use at_client::Urc;
use nom::{
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, u16 as dec_u16, u8 as dec_u8},
    combinator::all_consuming,
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};

/// Unsolicited results emitted by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiUrc {
    /// `+CIPSTA_CUR:<field>:"<value>"`
    StationInfo,
    /// `<link>,CLOSED`
    Closed,
    /// `<link>,CONNECT`
    Connect,
    WifiDisconnect,
    /// `+IPD,<link>,<len>:` followed by `len` raw bytes
    Ipd,
    /// `SEND OK` or `SEND FAIL`
    SendResult,
}

/// URCs of the ESP8266 AT firmware, in matching order.
pub const URC_TABLE: &[Urc<WifiUrc>] = &[
    Urc::new("+CIPSTA_CUR:", "\r\n", WifiUrc::StationInfo),
    Urc::new("", ",CLOSED\r\n", WifiUrc::Closed),
    Urc::new("", ",CONNECT\r\n", WifiUrc::Connect),
    Urc::new("", "WIFI DISCONNECT\r\n", WifiUrc::WifiDisconnect),
    Urc::new("+IPD", ":", WifiUrc::Ipd),
    Urc::new("SEND OK", "\r\n", WifiUrc::SendResult),
    Urc::new("SEND FAIL", "\r\n", WifiUrc::SendResult),
];

/// Station address fields reported by `AT+CIPSTA_CUR?`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StationField {
    Ip,
    Gateway,
    Netmask,
}

/// Link id of a `<link>,CONNECT` or `<link>,CLOSED` line.
pub(crate) fn link_event<'a>(line: &'a [u8], event: &'static str) -> Option<u8> {
    let parsed: IResult<&'a [u8], u8> = terminated(dec_u8, tag(event))(line);
    parsed.ok().map(|(_, link)| link)
}

/// Link id and payload length of an `+IPD,<link>,<len>:` line.
pub(crate) fn ipd(line: &[u8]) -> Option<(u8, usize)> {
    let parsed: IResult<&[u8], (u8, u16)> = delimited(
        tag("+IPD,"),
        separated_pair(dec_u8, char(','), dec_u16),
        char(':'),
    )(line);
    parsed.ok().map(|(_, (link, len))| (link, len as usize))
}

/// Payload length of an `+IPD` line whose link id did not parse. The length
/// is the last comma separated field before the colon.
pub(crate) fn ipd_len(line: &[u8]) -> Option<usize> {
    let field = line.strip_suffix(b":")?.rsplit(|c| *c == b',').next()?;
    let parsed: IResult<&[u8], u16> = all_consuming(dec_u16)(field);
    parsed.ok().map(|(_, len)| len as usize)
}

/// Field and value of a `+CIPSTA_CUR:<field>:"<value>"` line.
pub(crate) fn station_info(line: &[u8]) -> Option<(StationField, &[u8])> {
    let parsed: IResult<&[u8], (&[u8], char, &[u8])> = preceded(
        tag("+CIPSTA_CUR:"),
        tuple((
            take_while1(|c: u8| c.is_ascii_alphabetic()),
            char(':'),
            delimited(char('"'), take_till(|c: u8| c == b'"'), char('"')),
        )),
    )(line);
    let (_, (field, _, value)) = parsed.ok()?;

    let field = match field {
        b"ip" => StationField::Ip,
        b"gateway" => StationField::Gateway,
        b"netmask" => StationField::Netmask,
        _ => return None,
    };
    Some((field, value))
}
