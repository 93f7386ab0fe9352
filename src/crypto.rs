/// Token codec: decrypts the base64-wrapped first line of a connection into
/// a `host:port` backend address.
///
/// Wire shape follows the OpenSSL `enc -aes-256-cbc` convention the spec
/// cites directly ("matching the conventional `Salted__` framing"): the
/// decoded blob is either
///
///   `"Salted__" || salt(8) || ciphertext`    (salt explicitly framed), or
///   `salt(8) || ciphertext`                  (bare salt, no magic prefix)
///
/// Either way, AES-256 key and IV material are derived from `secret` and
/// `salt` via the OpenSSL `EVP_BytesToKey` MD5 chain — this is what gives
/// every token its own effective IV without transmitting one separately:
/// a fresh random salt per encryption yields a fresh derived IV. The codec
/// does not distinguish *why* a token failed: any decode, padding, or
/// address-shape failure collapses to a single [`CryptoError`].
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;

const SALT_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

static HOST_PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s:]+:[0-9]{1,5}$").unwrap());

#[derive(Debug, PartialEq, Eq)]
pub struct CryptoError;

/// Decrypt a base64-encoded token into a validated `host:port` string.
///
/// Any failure — bad base64, a blob too short to hold a salt, a PKCS7
/// padding mismatch, or a plaintext that isn't a `host:port` — is reported
/// uniformly as [`CryptoError`], per the data model's closed error channel
/// for this component.
pub fn decrypt_token(secret: &[u8], token: &[u8]) -> Result<String, CryptoError> {
    let decoded = STANDARD.decode(token).map_err(|_| CryptoError)?;

    let (salt, ciphertext) = if decoded.len() >= SALT_MAGIC.len() + SALT_LEN
        && &decoded[..SALT_MAGIC.len()] == &SALT_MAGIC[..]
    {
        let rest = &decoded[SALT_MAGIC.len()..];
        (&rest[..SALT_LEN], &rest[SALT_LEN..])
    } else if decoded.len() >= SALT_LEN {
        (&decoded[..SALT_LEN], &decoded[SALT_LEN..])
    } else {
        return Err(CryptoError);
    };

    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(CryptoError);
    }

    let (key, iv) = evp_bytes_to_key(secret, salt);

    let mut buf = ciphertext.to_vec();
    let plaintext = Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| CryptoError)?;

    let address = std::str::from_utf8(plaintext).map_err(|_| CryptoError)?;
    if !HOST_PORT.is_match(address) {
        return Err(CryptoError);
    }

    Ok(address.to_string())
}

/// Encrypt a `host:port` address the same way a client would, for tests.
#[cfg(test)]
pub fn encrypt_token(secret: &[u8], address: &str) -> String {
    use rand::RngCore;

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let (key, iv) = evp_bytes_to_key(secret, &salt);

    let plaintext = address.as_bytes();
    let mut buf = vec![0u8; plaintext.len() + 16];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .expect("buffer sized with one block of slack");

    let mut blob = Vec::with_capacity(SALT_MAGIC.len() + SALT_LEN + ciphertext.len());
    blob.extend_from_slice(SALT_MAGIC);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(ciphertext);

    STANDARD.encode(blob)
}

/// OpenSSL's `EVP_BytesToKey` with MD5, one-shot-derive enough material for
/// a 32-byte key and a 16-byte IV.
fn evp_bytes_to_key(secret: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(secret);
        hasher.update(salt);
        let digest = hasher.finalize();
        material.extend_from_slice(&digest);
        prev = digest.to_vec();
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"correct horse battery staple";

    #[test]
    fn round_trips_a_valid_address() {
        let token = encrypt_token(SECRET, "127.0.0.1:9000");
        let decoded = decrypt_token(SECRET, token.as_bytes()).unwrap();
        assert_eq!(decoded, "127.0.0.1:9000");
    }

    #[test]
    fn each_encryption_uses_a_fresh_salt() {
        let a = encrypt_token(SECRET, "127.0.0.1:9000");
        let b = encrypt_token(SECRET, "127.0.0.1:9000");
        assert_ne!(a, b, "same plaintext should not yield identical ciphertext");
    }

    #[test]
    fn rejects_bad_base64() {
        let err = decrypt_token(SECRET, b"not-base64!!!").unwrap_err();
        assert_eq!(err, CryptoError);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = encrypt_token(SECRET, "127.0.0.1:9000");
        let err = decrypt_token(b"wrong secret", token.as_bytes()).unwrap_err();
        assert_eq!(err, CryptoError);
    }

    #[test]
    fn rejects_decrypted_non_address() {
        // Encrypt something that is not a valid host:port shape.
        let token = encrypt_token(SECRET, "not an address at all");
        let err = decrypt_token(SECRET, token.as_bytes()).unwrap_err();
        assert_eq!(err, CryptoError);
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let token = encrypt_token(SECRET, "127.0.0.1:9000");
        let truncated = &token[..token.len() - 4];
        let err = decrypt_token(SECRET, truncated.as_bytes()).unwrap_err();
        assert_eq!(err, CryptoError);
    }
}
