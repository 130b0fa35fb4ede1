//! 密码的对称加密存储
//!
//! AES-256-CBC，PKCS#7 填充，每次加密使用新的随机 IV。
//! 存储格式为 base64(IV‖密文)，密钥版本单独存放在 `users.password_key_version`。

use std::collections::BTreeMap;

use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose};
use cbc::{Decryptor, Encryptor};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::ConfigError;
use crate::error::{AuthError, AuthResult};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

pub struct CredentialCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);

        let ct = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut packed = Vec::with_capacity(BLOCK_SIZE + ct.len());
        packed.extend_from_slice(&iv);
        packed.extend_from_slice(&ct);
        packed
    }

    pub fn decrypt_bytes(&self, payload: &[u8]) -> AuthResult<Vec<u8>> {
        // 至少需要 IV 加一个密文块，且密文按块对齐
        if payload.len() < 2 * BLOCK_SIZE || payload.len() % BLOCK_SIZE != 0 {
            return Err(AuthError::Crypto);
        }
        let (iv, ct) = payload.split_at(BLOCK_SIZE);

        Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| AuthError::Crypto)?
            .decrypt_padded_vec_mut::<Pkcs7>(ct)
            .map_err(|_| AuthError::Crypto)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        general_purpose::STANDARD.encode(self.encrypt_bytes(plaintext.as_bytes()))
    }

    pub fn decrypt(&self, encoded: &str) -> AuthResult<String> {
        let payload = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Crypto)?;
        let plaintext = self.decrypt_bytes(&payload)?;
        String::from_utf8(plaintext).map_err(|_| AuthError::Crypto)
    }
}

/// 按版本管理的密钥集合，新数据总是用当前版本加密
#[derive(Debug)]
pub struct CredentialKeyring {
    current: u16,
    ciphers: BTreeMap<u16, CredentialCipher>,
    /// 用户不存在时用来解密的占位密文，使两条拒绝路径耗时一致
    decoy: String,
}

impl CredentialKeyring {
    pub fn new(keys: &BTreeMap<u16, [u8; 32]>, current: u16) -> Result<Self, ConfigError> {
        if !keys.contains_key(&current) {
            return Err(ConfigError::Invalid {
                name: "CREDENTIAL_KEY_VERSION",
                reason: format!("no key for version {}", current),
            });
        }
        let ciphers = keys
            .iter()
            .map(|(version, key)| (*version, CredentialCipher::new(*key)))
            .collect::<BTreeMap<_, _>>();
        let decoy = ciphers[&current].encrypt("decoy-credential");
        Ok(Self {
            current,
            ciphers,
            decoy,
        })
    }

    pub fn current_version(&self) -> u16 {
        self.current
    }

    pub fn encrypt(&self, plaintext: &str) -> (u16, String) {
        // new() 保证当前版本存在
        let cipher = &self.ciphers[&self.current];
        (self.current, cipher.encrypt(plaintext))
    }

    pub fn decrypt(&self, version: u16, encoded: &str) -> AuthResult<String> {
        let cipher = self.ciphers.get(&version).ok_or_else(|| {
            tracing::error!("credential encrypted with unknown key version {}", version);
            AuthError::Crypto
        })?;
        cipher.decrypt(encoded)
    }

    /// 按真实密码的流程解密并比较占位密文，结果丢弃
    pub fn compare_decoy(&self, password: &str) {
        if let Ok(stored) = self.decrypt(self.current, &self.decoy) {
            std::hint::black_box(constant_time_eq(stored.as_bytes(), password.as_bytes()));
        }
    }
}

/// 常量时间比较，防止时序攻击
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
