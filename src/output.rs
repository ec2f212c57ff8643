use anyhow::Result;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

use crate::transform::RigidTransform;

pub const TRANSFORM_OSC_ADDR: &str = "/garment/transform";

/// レンダラーへ送信するOSCメッセージを構築
/// 引数: index, tracking, x, y, z, qx, qy, qz, qw, sx, sy, sz
/// tracking: 0=保持中(Frozen/未初期化), 1=追従中
pub fn build_osc_message(index: i32, tracking: bool, transform: &RigidTransform) -> OscMessage {
    let q = transform.quaternion();
    let mut args = Vec::with_capacity(12);
    args.push(OscType::Int(index));
    args.push(OscType::Int(tracking as i32));
    args.extend(transform.position.iter().map(|&v| OscType::Float(v)));
    args.extend(q.iter().map(|&v| OscType::Float(v)));
    args.extend(transform.scale.iter().map(|&v| OscType::Float(v)));
    OscMessage {
        addr: TRANSFORM_OSC_ADDR.to_string(),
        args,
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_osc_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// 変換をUDPで送るクライアント
pub struct TransformSender {
    socket: UdpSocket,
    target_addr: String,
}

impl TransformSender {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn send(&self, index: i32, tracking: bool, transform: &RigidTransform) -> Result<()> {
        let msg = build_osc_message(index, tracking, transform);
        let data = encode_osc_message(&msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_osc_message_address() {
        let msg = build_osc_message(0, true, &RigidTransform::identity());
        assert_eq!(msg.addr, "/garment/transform");
    }

    #[test]
    fn test_build_osc_message_args() {
        let t = RigidTransform::new([1.0, 2.0, 3.0], [0.0; 3], [1.5, 1.5, 1.5]);
        let msg = build_osc_message(2, true, &t);

        // 引数: index, tracking, x, y, z, qx, qy, qz, qw, sx, sy, sz
        assert_eq!(msg.args.len(), 12);
        assert_eq!(msg.args[0], OscType::Int(2));
        assert_eq!(msg.args[1], OscType::Int(1));
        // position
        assert_eq!(msg.args[2], OscType::Float(1.0));
        assert_eq!(msg.args[3], OscType::Float(2.0));
        assert_eq!(msg.args[4], OscType::Float(3.0));
        // 回転なし → (0, 0, 0, 1)
        assert_eq!(msg.args[5], OscType::Float(0.0));
        assert_eq!(msg.args[8], OscType::Float(1.0));
        // scale
        assert_eq!(msg.args[9], OscType::Float(1.5));
        assert_eq!(msg.args[11], OscType::Float(1.5));
    }

    #[test]
    fn test_build_osc_message_frozen() {
        let msg = build_osc_message(0, false, &RigidTransform::identity());
        assert_eq!(msg.args[1], OscType::Int(0));
    }

    #[test]
    fn test_encode_osc_message() {
        let msg = build_osc_message(0, true, &RigidTransform::identity());
        let encoded = encode_osc_message(&msg).unwrap();
        assert!(!encoded.is_empty());
        assert_eq!(encoded.len() % 4, 0);
    }

    #[test]
    fn test_send_over_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = receiver.local_addr().unwrap().to_string();

        let sender = TransformSender::new(&addr).unwrap();
        let t = RigidTransform::new([0.5, 1.0, -1.0], [0.0, std::f32::consts::PI, 0.0], [1.2; 3]);
        sender.send(3, true, &t).unwrap();

        let mut buf = [0u8; 1024];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..n]).unwrap();
        match packet {
            OscPacket::Message(msg) => assert_eq!(msg, build_osc_message(3, true, &t)),
            other => panic!("unexpected packet {:?}", other),
        }
    }
}
