use etherparse::{PacketBuilder, WriteError};

#[derive(Debug, Clone)]
pub struct PacketGenerator {
    src_addr: [u8; 6],
    dst_addr: [u8; 6],
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
}

impl Default for PacketGenerator {
    fn default() -> Self {
        Self {
            src_addr: [0xf6, 0xe0, 0xf6, 0xc9, 0x60, 0x0a],
            dst_addr: [0x4a, 0xf1, 0x30, 0xeb, 0x0d, 0x31],
            src_ip: [192, 168, 69, 1],
            dst_ip: [192, 168, 69, 2],
        }
    }
}

impl PacketGenerator {
    /// Generate an ETH frame w/ UDP as transport layer and payload size `payload_len`
    pub fn generate_packet(
        &self,
        src_port: u16,
        dst_port: u16,
        payload_len: usize,
    ) -> Result<Vec<u8>, WriteError> {
        let builder = PacketBuilder::ethernet2(
            self.src_addr, // src mac
            self.dst_addr, // dst mac
        )
        .ipv4(
            self.src_ip, // src ip
            self.dst_ip, // dst ip
            20,          // time to live
        )
        .udp(src_port, dst_port);

        let payload = generate_random_bytes(payload_len);

        let mut result = Vec::new();

        builder.write(&mut result, &payload)?;

        Ok(result)
    }

    /// Packet generator with `src` and `dst` swapped.
    pub fn into_swapped(self) -> Self {
        Self {
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
        }
    }
}

fn generate_random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|_| rand::random::<u8>()).collect()
}
