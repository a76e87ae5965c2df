//! Modbus-TCP server side of a session.
//!
//! Each received chunk is treated as one ADU: a 7 byte MBAP header followed
//! by the PDU. Only the two register read functions are served, everything
//! else is ignored without an answer.

use nom::{
    number::complete::{be_u16, be_u8},
    sequence::tuple,
    IResult,
};

use crate::error::GatewayError;

/// Largest Modbus-TCP ADU
pub const MAX_ADU_LENGTH: usize = 260;
const MBAP_HEADER_LENGTH: usize = 7;

pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Largest register count of one read request
pub const MAX_READ_REGISTERS: u16 = 125;

/// Turns one received chunk into the bytes to send back.
pub trait SessionProcessor {
    /// Returns the length of the answer written to `response`, 0 when there
    /// is nothing to send. An error closes the session.
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, GatewayError>;
}

/// Register values served by the gateway.
pub trait RegisterSource {
    fn read(&self, address: u16) -> u16;
}

/// Addresses past the end of the slice read as 0.
impl RegisterSource for [u16] {
    fn read(&self, address: u16) -> u16 {
        self.get(address as usize).copied().unwrap_or(0)
    }
}

impl<const N: usize> RegisterSource for [u16; N] {
    fn read(&self, address: u16) -> u16 {
        self.as_slice().read(address)
    }
}

impl<T: RegisterSource + ?Sized> RegisterSource for &T {
    fn read(&self, address: u16) -> u16 {
        (**self).read(address)
    }
}

struct MbapHeader {
    transaction_id: u16,
    protocol_id: u16,
    length: u16,
    unit_id: u8,
}

fn mbap_header(input: &[u8]) -> IResult<&[u8], MbapHeader> {
    let (rest, (transaction_id, protocol_id, length, unit_id)) =
        tuple((be_u16, be_u16, be_u16, be_u8))(input)?;
    Ok((
        rest,
        MbapHeader {
            transaction_id,
            protocol_id,
            length,
            unit_id,
        },
    ))
}

fn read_request(input: &[u8]) -> IResult<&[u8], (u8, u16, u16)> {
    tuple((be_u8, be_u16, be_u16))(input)
}

/// Modbus-TCP slave answering register reads from a [`RegisterSource`].
pub struct ModbusTcpGateway<R> {
    slave: u8,
    registers: R,
}

impl<R: RegisterSource> ModbusTcpGateway<R> {
    /// Slave address 1.
    pub fn new(registers: R) -> Self {
        Self {
            slave: 1,
            registers,
        }
    }

    #[must_use]
    pub fn with_slave(mut self, slave: u8) -> Self {
        self.slave = slave;
        self
    }

    pub fn slave(&self) -> u8 {
        self.slave
    }
}

impl<R: RegisterSource> SessionProcessor for ModbusTcpGateway<R> {
    fn process(&mut self, request: &[u8], response: &mut [u8]) -> Result<usize, GatewayError> {
        if request.len() > MAX_ADU_LENGTH {
            return Err(GatewayError::Malformed);
        }
        let (pdu, header) = mbap_header(request).map_err(|_| GatewayError::Malformed)?;
        if header.protocol_id != 0
            || pdu.is_empty()
            || header.length as usize != request.len() - (MBAP_HEADER_LENGTH - 1)
        {
            return Err(GatewayError::Malformed);
        }

        if header.unit_id != self.slave {
            trace!("ignore request for slave {}", header.unit_id);
            return Ok(0);
        }

        let function = pdu[0];
        if function != FC_READ_HOLDING_REGISTERS && function != FC_READ_INPUT_REGISTERS {
            debug!("unsupported function code {}", function);
            return Ok(0);
        }

        // Function code, start address, quantity
        if pdu.len() != 5 {
            return Err(GatewayError::Malformed);
        }
        let (_, (_, address, quantity)) =
            read_request(pdu).map_err(|_| GatewayError::Malformed)?;

        if quantity == 0 || quantity > MAX_READ_REGISTERS {
            return Err(GatewayError::InvalidQuantity);
        }
        if address as u32 + quantity as u32 > 0x10000 {
            return Err(GatewayError::InvalidAddress);
        }

        let byte_count = quantity as usize * 2;
        let total = MBAP_HEADER_LENGTH + 2 + byte_count;
        if response.len() < total {
            return Err(GatewayError::Malformed);
        }

        response[0..2].copy_from_slice(&header.transaction_id.to_be_bytes());
        response[2..4].copy_from_slice(&0u16.to_be_bytes());
        response[4..6].copy_from_slice(&((3 + byte_count) as u16).to_be_bytes());
        response[6] = header.unit_id;
        response[7] = function;
        response[8] = byte_count as u8;
        for (i, chunk) in response[9..total].chunks_exact_mut(2).enumerate() {
            let value = self.registers.read(address.wrapping_add(i as u16));
            chunk.copy_from_slice(&value.to_be_bytes());
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTERS: [u16; 12] = [
        0x0001, 0x0203, 0x0405, 0x0607, 0x0809, 0x0a0b, 0x0c0d, 0x0e0f, 0x1011, 0x1213, 0x1415,
        0x1617,
    ];

    fn gateway() -> ModbusTcpGateway<[u16; 12]> {
        ModbusTcpGateway::new(REGISTERS)
    }

    #[test]
    fn read_holding_registers() {
        let request = [0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x0a];
        let mut response = [0u8; MAX_ADU_LENGTH];

        let len = gateway().process(&request, &mut response).unwrap();

        assert_eq!(len, 9 + 20);
        assert_eq!(&response[..9], &[0x12, 0x34, 0x00, 0x00, 0x00, 0x17, 0x01, 0x03, 20]);
        assert_eq!(&response[9..13], &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(&response[27..29], &[0x12, 0x13]);
    }

    #[test]
    fn read_input_registers_past_source() {
        let request = [0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0x00, 0x0b, 0x00, 0x02];
        let mut response = [0u8; MAX_ADU_LENGTH];

        let len = gateway().process(&request, &mut response).unwrap();

        assert_eq!(len, 13);
        assert_eq!(&response[7..13], &[0x04, 4, 0x16, 0x17, 0x00, 0x00]);
    }

    #[test]
    fn other_slave_ignored() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x02, 0x03, 0x00, 0x00, 0x00, 0x01];
        let mut response = [0u8; MAX_ADU_LENGTH];

        assert_eq!(gateway().process(&request, &mut response), Ok(0));
        assert_eq!(
            gateway().with_slave(2).process(&request, &mut response),
            Ok(11)
        );
    }

    #[test]
    fn unsupported_function_ignored() {
        let request = [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x00, 0x00, 0x01];
        let mut response = [0u8; MAX_ADU_LENGTH];

        assert_eq!(gateway().process(&request, &mut response), Ok(0));
    }

    #[test]
    fn invalid_requests() {
        let mut response = [0u8; MAX_ADU_LENGTH];
        let mut check = |request: &[u8], expected: GatewayError| {
            assert_eq!(gateway().process(request, &mut response), Err(expected));
        };

        // Truncated header
        check(&[0x00, 0x01, 0x00], GatewayError::Malformed);
        // Protocol id
        check(
            &[0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01],
            GatewayError::Malformed,
        );
        // Length field
        check(
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x07, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01],
            GatewayError::Malformed,
        );
        // Short PDU
        check(
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x01, 0x03, 0x00, 0x00],
            GatewayError::Malformed,
        );
        check(
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00],
            GatewayError::InvalidQuantity,
        );
        check(
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x7e],
            GatewayError::InvalidQuantity,
        );
        check(
            &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x04, 0xff, 0xff, 0x00, 0x02],
            GatewayError::InvalidAddress,
        );
        check(&[0u8; MAX_ADU_LENGTH + 1], GatewayError::Malformed);
    }
}
