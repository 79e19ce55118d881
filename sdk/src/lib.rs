// Hardware wallet conformance harness and supporting software libraries
//
// Copyright (C) 2024 Alekos Filini
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use core::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use model::{sw, DerivationPath, DeviceError, PublicKey, PUBLIC_KEY_LEN};

pub const CLA: u8 = 0x00;

pub const INS_GET_VERSION: u8 = 0x00;
pub const INS_VERIFY_ADDRESS: u8 = 0x01;
pub const INS_GET_PUBLIC_KEY: u8 = 0x02;
pub const INS_SIGN_TX: u8 = 0x03;

pub const MAX_APDU_LEN: usize = 255;

/// A single command unit sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl Apdu {
    pub fn new(ins: u8, data: Vec<u8>) -> Self {
        Apdu {
            cla: CLA,
            ins,
            p1: 0x00,
            p2: 0x00,
            data,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.data.len());
        out.extend_from_slice(&[self.cla, self.ins, self.p1, self.p2, self.data.len() as u8]);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Payload and trailing status word of a single exchange.
pub type Response = (Vec<u8>, u16);

/// Byte-exchange capability with the device.
///
/// Command transport is an external collaborator: anything able to carry an
/// APDU to the device and return its answer qualifies. An exchange may stay
/// pending for as long as the device is waiting for on-screen input.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn exchange(&self, apdu: &Apdu) -> Result<Response, DeviceError>;
}

/// Transport over a byte stream speaking the emulator's APDU framing: a
/// big-endian u32 length prefix in both directions, with the response
/// carrying a two-byte status word after the length-counted data.
pub struct StreamTransport<S> {
    stream: Mutex<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        StreamTransport {
            stream: Mutex::new(stream),
        }
    }
}

fn io_err(e: std::io::Error) -> DeviceError {
    DeviceError::Transport(e.to_string())
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for StreamTransport<S> {
    async fn exchange(&self, apdu: &Apdu) -> Result<Response, DeviceError> {
        let serialized = apdu.serialize();
        log::trace!("> {:02X?}", serialized);

        let mut stream = self.stream.lock().await;

        stream
            .write_all(&(serialized.len() as u32).to_be_bytes())
            .await
            .map_err(io_err)?;
        stream.write_all(&serialized).await.map_err(io_err)?;

        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.map_err(io_err)?;
        let len = u32::from_be_bytes(len) as usize;

        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).await.map_err(io_err)?;

        let mut sw = [0u8; 2];
        stream.read_exact(&mut sw).await.map_err(io_err)?;
        let sw = u16::from_be_bytes(sw);

        log::trace!("< {:02X?} sw=0x{:04X}", data, sw);

        Ok((data, sw))
    }
}

pub type TcpTransport = StreamTransport<TcpStream>;

impl StreamTransport<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, DeviceError> {
        let stream = TcpStream::connect(addr).await.map_err(io_err)?;
        Ok(StreamTransport::new(stream))
    }
}

/// Splits a payload into device-sized chunks. Empty payloads still produce
/// a single empty chunk so every command sends at least one APDU.
pub fn split_message(payload: &[u8], max_size: usize) -> Vec<Vec<u8>> {
    if payload.is_empty() {
        return vec![Vec::new()];
    }
    payload.chunks(max_size).map(|chunk| chunk.to_vec()).collect()
}

fn pop_size_prefixed(buf: &[u8]) -> Result<(&[u8], &[u8]), DeviceError> {
    let (&len, rest) = buf
        .split_first()
        .ok_or_else(|| DeviceError::Protocol("empty response".to_string()))?;
    if rest.len() < len as usize {
        return Err(DeviceError::Protocol(format!(
            "truncated response: expected {} bytes, got {}",
            len,
            rest.len()
        )));
    }
    Ok((&rest[..len as usize], &rest[len as usize..]))
}

/// App identity as reported by the GET_VERSION instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub name: String,
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}.{}", self.name, self.major, self.minor, self.patch)
    }
}

/// Client for one connected device.
pub struct DeviceSdk<T> {
    transport: T,
}

impl<T: Transport> DeviceSdk<T> {
    pub fn new(transport: T) -> Self {
        DeviceSdk { transport }
    }

    async fn command(&self, ins: u8, payload: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let chunks = split_message(payload, MAX_APDU_LEN);
        let count = chunks.len();

        let mut result = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let (data, sw) = self.transport.exchange(&Apdu::new(ins, chunk)).await?;

            match sw {
                sw::OK => result = data,
                sw::DENY => return Err(DeviceError::Rejected { sw }),
                _ => {
                    return Err(DeviceError::Protocol(format!(
                        "unexpected status 0x{:04X} ({})",
                        sw,
                        sw::describe(sw)
                    )))
                }
            }

            if i + 1 < count && !result.is_empty() {
                return Err(DeviceError::Protocol(
                    "device answered before the final chunk".to_string(),
                ));
            }
        }

        Ok(result)
    }

    pub async fn get_version(&self) -> Result<AppVersion, DeviceError> {
        let data = self.command(INS_GET_VERSION, &[]).await?;
        if data.len() < 3 {
            return Err(DeviceError::Protocol("version response too short".to_string()));
        }
        let name = String::from_utf8(data[3..].to_vec())
            .map_err(|_| DeviceError::Protocol("app name is not valid utf-8".to_string()))?;

        Ok(AppVersion {
            major: data[0],
            minor: data[1],
            patch: data[2],
            name,
        })
    }

    pub async fn get_public_key(&self, path: &DerivationPath) -> Result<PublicKey, DeviceError> {
        self.public_key_impl(INS_GET_PUBLIC_KEY, path).await
    }

    /// Like [`Self::get_public_key`] but asks the device to show the
    /// derived address on screen first; pends until the user approves.
    pub async fn verify_address(&self, path: &DerivationPath) -> Result<PublicKey, DeviceError> {
        self.public_key_impl(INS_VERIFY_ADDRESS, path).await
    }

    async fn public_key_impl(&self, ins: u8, path: &DerivationPath) -> Result<PublicKey, DeviceError> {
        let data = self.command(ins, &path.to_wire()).await?;
        let (public_key, rest) = pop_size_prefixed(&data)?;
        let (_chain_code, _) = pop_size_prefixed(rest)?;

        let public_key: [u8; PUBLIC_KEY_LEN] = public_key.try_into().map_err(|_| {
            DeviceError::Protocol(format!(
                "expected a {} byte public key, got {}",
                PUBLIC_KEY_LEN,
                public_key.len()
            ))
        })?;

        Ok(PublicKey(public_key))
    }

    /// Asks the device to sign `transaction` with the key at `path`.
    ///
    /// The returned future stays pending while the device walks the user
    /// through the on-screen approval flow; it resolves with the raw
    /// signature bytes once the user confirms, or with
    /// [`DeviceError::Rejected`] if they decline. The signature is returned
    /// unchecked: length and validity are the caller's assertions.
    pub async fn sign_transaction(
        &self,
        path: &DerivationPath,
        transaction: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let wire_path = path.to_wire();
        let mut payload = Vec::with_capacity(4 + transaction.len() + wire_path.len());
        payload.extend_from_slice(&(transaction.len() as u32).to_le_bytes());
        payload.extend_from_slice(transaction);
        payload.extend_from_slice(&wire_path);

        let data = self.command(INS_SIGN_TX, &payload).await?;
        let (signature, _) = pop_size_prefixed(&data)?;

        Ok(signature.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::DuplexStream;

    #[test]
    fn test_apdu_serialize() {
        let apdu = Apdu::new(INS_SIGN_TX, vec![0xAA, 0xBB]);
        assert_eq!(apdu.serialize(), vec![0x00, 0x03, 0x00, 0x00, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn test_split_message() {
        assert_eq!(split_message(&[], MAX_APDU_LEN), vec![Vec::<u8>::new()]);

        let exact = vec![0u8; MAX_APDU_LEN];
        assert_eq!(split_message(&exact, MAX_APDU_LEN).len(), 1);

        let chunks = split_message(&vec![7u8; MAX_APDU_LEN + 1], MAX_APDU_LEN);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_APDU_LEN);
        assert_eq!(chunks[1], vec![7u8]);
    }

    #[test]
    fn test_pop_size_prefixed() {
        let buf = [2, 0xAA, 0xBB, 1, 0xCC];
        let (first, rest) = pop_size_prefixed(&buf).unwrap();
        assert_eq!(first, &[0xAA, 0xBB]);
        let (second, rest) = pop_size_prefixed(rest).unwrap();
        assert_eq!(second, &[0xCC]);
        assert!(rest.is_empty());

        assert!(matches!(
            pop_size_prefixed(&[]),
            Err(DeviceError::Protocol(_))
        ));
        assert!(matches!(
            pop_size_prefixed(&[5, 0xAA]),
            Err(DeviceError::Protocol(_))
        ));
    }

    async fn read_apdu(stream: &mut DuplexStream) -> Apdu {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.unwrap();
        let mut buf = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(buf[4] as usize, buf.len() - 5);
        Apdu {
            cla: buf[0],
            ins: buf[1],
            p1: buf[2],
            p2: buf[3],
            data: buf[5..].to_vec(),
        }
    }

    async fn write_response(stream: &mut DuplexStream, data: &[u8], sw: u16) {
        stream
            .write_all(&(data.len() as u32).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(data).await.unwrap();
        stream.write_all(&sw.to_be_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_public_key() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let device = tokio::spawn(async move {
            let apdu = read_apdu(&mut remote).await;
            assert_eq!(apdu.ins, INS_GET_PUBLIC_KEY);
            // 3 components, little-endian, all hardened
            assert_eq!(apdu.data[0], 3);
            assert_eq!(&apdu.data[1..5], &[0x2C, 0x00, 0x00, 0x80]);

            let mut response = vec![32];
            response.extend_from_slice(&[0x19; 32]);
            response.push(0); // empty chain code
            write_response(&mut remote, &response, sw::OK).await;
        });

        let path: DerivationPath = "44'/535348'/0'".parse().unwrap();
        let public_key = sdk.get_public_key(&path).await.unwrap();
        assert_eq!(public_key.0, [0x19; 32]);

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_address_uses_the_confirming_instruction() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let device = tokio::spawn(async move {
            let apdu = read_apdu(&mut remote).await;
            assert_eq!(apdu.ins, INS_VERIFY_ADDRESS);

            let mut response = vec![32];
            response.extend_from_slice(&[0x19; 32]);
            response.push(0);
            write_response(&mut remote, &response, sw::OK).await;
        });

        let path: DerivationPath = "44'/535348'/0'".parse().unwrap();
        let public_key = sdk.verify_address(&path).await.unwrap();
        assert_eq!(public_key.0, [0x19; 32]);

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_transaction_chunked() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let transaction = vec![0xEE; 300];

        let device = tokio::spawn(async move {
            // 4 (length) + 300 (tx) + 13 (path) = 317 bytes, two chunks
            let first = read_apdu(&mut remote).await;
            assert_eq!(first.ins, INS_SIGN_TX);
            assert_eq!(first.data.len(), MAX_APDU_LEN);
            assert_eq!(&first.data[..4], &300u32.to_le_bytes());
            write_response(&mut remote, &[], sw::OK).await;

            let second = read_apdu(&mut remote).await;
            assert_eq!(second.data.len(), 317 - MAX_APDU_LEN);

            let mut response = vec![64];
            response.extend_from_slice(&[0x55; 64]);
            write_response(&mut remote, &response, sw::OK).await;
        });

        let path: DerivationPath = "44'/535348'/0'".parse().unwrap();
        let signature = sdk.sign_transaction(&path, &transaction).await.unwrap();
        assert_eq!(signature, vec![0x55; 64]);

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_sign_transaction_denied() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let device = tokio::spawn(async move {
            let _ = read_apdu(&mut remote).await;
            write_response(&mut remote, &[], sw::DENY).await;
        });

        let path: DerivationPath = "44'/535348'/0'".parse().unwrap();
        let result = sdk.sign_transaction(&path, b"refused").await;
        assert_eq!(result, Err(DeviceError::Rejected { sw: sw::DENY }));

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_version() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let device = tokio::spawn(async move {
            let apdu = read_apdu(&mut remote).await;
            assert_eq!(apdu.ins, INS_GET_VERSION);
            assert!(apdu.data.is_empty());

            let mut response = vec![0, 3, 1];
            response.extend_from_slice(b"conformance example");
            write_response(&mut remote, &response, sw::OK).await;
        });

        let version = sdk.get_version().await.unwrap();
        assert_eq!(version.to_string(), "conformance example 0.3.1");

        device.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status_word() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let sdk = DeviceSdk::new(StreamTransport::new(local));

        let device = tokio::spawn(async move {
            let _ = read_apdu(&mut remote).await;
            write_response(&mut remote, &[], sw::TX_PARSING_FAIL).await;
        });

        let path: DerivationPath = "44'/535348'/0'".parse().unwrap();
        let result = sdk.sign_transaction(&path, b"garbage").await;
        match result {
            Err(DeviceError::Protocol(msg)) => assert!(msg.contains("0xB005")),
            other => panic!("expected a protocol error, got {:?}", other),
        }

        device.await.unwrap();
    }
}
