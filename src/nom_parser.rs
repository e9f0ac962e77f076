use nom::combinator::{all_consuming, map, verify};
use nom::number::complete::{le_u16, le_u32, u8};
use nom::sequence::tuple;
use nom::IResult;

type Buf = [u8];

pub(crate) mod master {
    use super::*;
    use crate::master::Emergency;
    use nom::bytes::complete::take;
    use nom::combinator::map_res;

    use core::convert::TryFrom;

    /// The fixed eight byte layout of an SDO server response.
    #[derive(PartialEq, Copy, Clone, Debug)]
    pub(crate) struct SdoResponse {
        pub command: u8,
        pub index: u16,
        pub subindex: u8,
        pub data: u32,
    }

    /// A boot-up message is a heartbeat carrying exactly one zero byte.
    pub(crate) fn parse_boot_up(buf: &Buf) -> bool {
        let boot_up: IResult<&Buf, u8> =
            all_consuming(verify(u8, |state: &u8| *state == 0))(buf);
        boot_up.is_ok()
    }

    /// Returns `None` unless `buf` is exactly eight bytes.
    pub(crate) fn parse_sdo_response(buf: &Buf) -> Option<SdoResponse> {
        sdo_response(buf).ok().map(|(_, response)| response)
    }

    fn sdo_response(buf: &Buf) -> IResult<&Buf, SdoResponse> {
        all_consuming(map(
            tuple((u8, le_u16, u8, le_u32)),
            |(command, index, subindex, data)| SdoResponse {
                command,
                index,
                subindex,
                data,
            },
        ))(buf)
    }

    /// Decode an EMCY payload. Bytes missing from a short frame read as zero.
    pub(crate) fn parse_emergency(node: u8, buf: &Buf) -> Emergency {
        let mut padded = [0; 8];
        let len = buf.len().min(padded.len());
        padded[..len].copy_from_slice(&buf[..len]);
        match emergency(&padded) {
            Ok((_, (error_code, error_register, manufacturer))) => Emergency {
                node,
                error_code,
                error_register,
                manufacturer,
            },
            // eight bytes always parse
            Err(_) => Emergency {
                node,
                error_code: 0,
                error_register: 0,
                manufacturer: [0; 5],
            },
        }
    }

    fn emergency(buf: &Buf) -> IResult<&Buf, (u16, u8, [u8; 5])> {
        all_consuming(tuple((
            le_u16,
            u8,
            map_res(take(5usize), <[u8; 5]>::try_from),
        )))(buf)
    }

}

#[cfg(feature = "std")]
pub(crate) mod slcan {
    use nom::branch::alt;
    use nom::bytes::streaming::{take_till, take_while_m_n};
    use nom::character::streaming::{char, one_of};
    use nom::combinator::{map_res, value};
    use nom::number::streaming::u8;
    use nom::sequence::{preceded, terminated, tuple};
    use nom::Err::Incomplete;
    use nom::IResult;

    use super::Buf;
    use crate::frame::{Frame, Payload};

    pub(crate) const BELL: u8 = 0x07;
    pub(crate) const CR: u8 = b'\r';

    #[derive(PartialEq, Clone, Debug)]
    pub(crate) enum SlcanToken {
        /// A standard data frame received from the bus.
        Frame(Frame),
        /// The adapter acknowledged a command or a transmitted frame.
        Ack,
        /// The adapter rejected the last command.
        Bell,
        /// A line we don't handle, e.g. extended or RTR frames.
        Skip,
        NeedData,
    }

    /// Parse one token from the start of `buf`.
    /// Returns the number of bytes consumed, zero if more data is needed.
    pub(crate) fn parse_token(buf: &Buf) -> (usize, SlcanToken) {
        match alt((frame, ack, bell, skip_line))(buf) {
            Ok((remaining, token)) => (buf.len() - remaining.len(), token),
            Err(Incomplete(_)) => (0, SlcanToken::NeedData),
            Err(_) => (buf.len(), SlcanToken::Skip),
        }
    }

    fn frame(buf: &Buf) -> IResult<&Buf, SlcanToken> {
        let (buf, (cob_id, len)) = preceded(char('t'), tuple((cob_id, dlc)))(buf)?;
        let (buf, hex) = terminated(
            take_while_m_n(2 * len, 2 * len, |c: u8| c.is_ascii_hexdigit()),
            char(CR as char),
        )(buf)?;
        let mut data = Payload::new();
        for pair in hex.chunks(2) {
            data.push(hex_value(pair[0]) << 4 | hex_value(pair[1]));
        }
        Ok((buf, SlcanToken::Frame(Frame::from_parts(cob_id, data))))
    }

    fn cob_id(buf: &Buf) -> IResult<&Buf, u16> {
        map_res(
            take_while_m_n(3, 3, |c: u8| c.is_ascii_hexdigit()),
            |x: &Buf| {
                let id = (hex_value(x[0]) as u16) << 8
                    | (hex_value(x[1]) as u16) << 4
                    | hex_value(x[2]) as u16;
                Frame::new(id, &[]).map(|frame| frame.cob_id())
            },
        )(buf)
    }

    fn dlc(buf: &Buf) -> IResult<&Buf, usize> {
        let (buf, digit) = one_of("012345678")(buf)?;
        Ok((buf, digit as usize - '0' as usize))
    }

    fn ack(buf: &Buf) -> IResult<&Buf, SlcanToken> {
        value(
            SlcanToken::Ack,
            alt((
                value((), char(CR as char)),
                value((), tuple((one_of("zZ"), char(CR as char)))),
            )),
        )(buf)
    }

    fn bell(buf: &Buf) -> IResult<&Buf, SlcanToken> {
        let (buf, _) = nom::combinator::verify(u8, |c: &u8| *c == BELL)(buf)?;
        Ok((buf, SlcanToken::Bell))
    }

    fn skip_line(buf: &Buf) -> IResult<&Buf, SlcanToken> {
        value(
            SlcanToken::Skip,
            terminated(take_till(|c: u8| c == CR), char(CR as char)),
        )(buf)
    }

    fn hex_value(c: u8) -> u8 {
        (c as char).to_digit(16).unwrap_or(0) as u8
    }

}
