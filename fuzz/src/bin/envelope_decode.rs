#[macro_use]
extern crate afl;
use securechat_e2e::MessageEnvelope;

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = MessageEnvelope::deserialize(data);
    });
}
