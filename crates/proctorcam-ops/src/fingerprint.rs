use tracing::warn;
use uuid::Uuid;

/// Stable identifier for this device, derived from host name, OS and architecture.
pub fn device_fingerprint() -> String {
    let host = match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("Unable to read host name for fingerprint: {err}");
            String::from("unknown-host")
        }
    };
    fingerprint_from_parts(&host, std::env::consts::OS, std::env::consts::ARCH)
}

pub fn fingerprint_from_parts(host: &str, os: &str, arch: &str) -> String {
    let seed = format!("{host}|{os}|{arch}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
        .simple()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_host_specific() {
        let a = fingerprint_from_parts("phone-1", "android", "aarch64");
        assert_eq!(a, fingerprint_from_parts("phone-1", "android", "aarch64"));
        assert_ne!(a, fingerprint_from_parts("phone-2", "android", "aarch64"));
        assert_eq!(a.len(), 32);
        assert_eq!(device_fingerprint(), device_fingerprint());
    }
}
