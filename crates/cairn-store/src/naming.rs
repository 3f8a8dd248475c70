use rand::rngs::OsRng;
use rand::RngCore;

/// Source of names for newly created stores.
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// 128 random bits from the operating system, hex-encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomNames;

impl NameGenerator for RandomNames {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

impl<F> NameGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}
