//! Pairing-based provable data possession over BLS12-381.
//!
//! Owner holds a scalar `x`, publishes `pk = x·g₂` and per-file randomness
//! `(u, v)`. For slice index `i` and challenge round `r` the tag is
//!
//! ```text
//! σᵢ = x · ( H(v‖i) + (mᵢ · u) · g₁ )
//! mᵢ = (ciphertext ‖ rand(r)) mod p        rand(r) = SHA-256((r·x)·g₁)
//! ```
//!
//! A peer answering a challenge `{(iⱼ, vⱼ)}` returns `σ = Σ vⱼσⱼ` and
//! `μ = (Σ vⱼmⱼ mod p)·g₁`; the verifier accepts iff
//! `e(σ, g₂) = e(Σ vⱼ·H(v‖iⱼ) + u·μ, pk)`.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use ark_bls12_381::{Bls12_381, Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::pairing::Pairing;
use ark_ec::{CurveGroup, Group};
use ark_ff::{BigInteger, Field, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use rand::seq::index::sample;

use crate::crypto::hash::{sha256, sha256_concat};
use crate::error::{Error, Result};

/// Default cap on the number of indices in one challenge.
pub const DEFAULT_MAX_INDEX_NUM: usize = 5;

/// Scalars travel as fixed-width big-endian bytes.
pub const SCALAR_LEN: usize = 32;

// =============================================================================
// Parameters and keys
// =============================================================================

/// Process-wide curve parameters: generators of 𝔾₁ and 𝔾₂.
///
/// Built once during engine bootstrap and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct PairingParams {
    g1: G1Projective,
    g2: G2Projective,
}

impl Default for PairingParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner's private scalar `x`.
#[derive(Clone, PartialEq, Eq)]
pub struct PdpPrivateKey(Fr);

/// Owner's public key `x·g₂`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdpPublicKey(G2Projective);

impl std::fmt::Debug for PdpPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PdpPrivateKey(..)")
    }
}

impl PdpPrivateKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        scalar_to_bytes(&self.0)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(Self(scalar_from_bytes(raw)?))
    }

    /// Deterministic key from an owner seed, so one configured secret
    /// yields the same PDP key across restarts.
    pub fn derive(seed: &[u8]) -> Result<Self> {
        let x = Fr::from_be_bytes_mod_order(&sha256_concat(&[b"provestor-pdp", seed]));
        if x.is_zero() {
            return Err(Error::crypto("derived pdp key is zero"));
        }
        Ok(Self(x))
    }
}

impl PdpPublicKey {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.0
            .into_affine()
            .serialize_compressed(&mut buf)
            .map_err(|e| Error::crypto(format!("failed to encode public key: {}", e)))?;
        Ok(buf)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let p = G2Affine::deserialize_compressed(raw)
            .map_err(|e| Error::encoding(format!("bad pdp public key: {}", e)))?;
        Ok(Self(p.into()))
    }
}

/// Challenge material produced by the owner for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingChallenge {
    pub indices: Vec<u64>,
    pub vs: Vec<Vec<u8>>,
    pub round: i64,
    pub rand_this_round: Vec<u8>,
}

// =============================================================================
// Scalar / point encoding
// =============================================================================

pub fn scalar_to_bytes(s: &Fr) -> Vec<u8> {
    s.into_bigint().to_bytes_be()
}

/// Parse a canonical big-endian scalar strictly below the group order.
pub fn scalar_from_bytes(raw: &[u8]) -> Result<Fr> {
    if raw.is_empty() || raw.len() > SCALAR_LEN {
        return Err(Error::param(format!("bad scalar length: {}", raw.len())));
    }
    let s = Fr::from_be_bytes_mod_order(raw);
    let mut padded = vec![0u8; SCALAR_LEN - raw.len()];
    padded.extend_from_slice(raw);
    if scalar_to_bytes(&s) != padded {
        return Err(Error::param("scalar is not below the group order"));
    }
    Ok(s)
}

fn g1_to_bytes(p: &G1Projective) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    p.into_affine()
        .serialize_compressed(&mut buf)
        .map_err(|e| Error::crypto(format!("failed to encode G1 point: {}", e)))?;
    Ok(buf)
}

fn g1_from_bytes(raw: &[u8]) -> Result<G1Projective> {
    let p = G1Affine::deserialize_compressed(raw)
        .map_err(|e| Error::encoding(format!("bad G1 point: {}", e)))?;
    Ok(p.into())
}

fn random_nonzero_scalar() -> Fr {
    let mut rng = rand::thread_rng();
    loop {
        let s = Fr::rand(&mut rng);
        if !s.is_zero() {
            return s;
        }
    }
}

/// Random non-zero scalar below the group order, big-endian encoded.
pub fn random_scalar_bytes() -> Vec<u8> {
    scalar_to_bytes(&random_nonzero_scalar())
}

/// Reduce slice ciphertext into the scalar field.
pub fn content_scalar(content: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(content)
}

/// `(content ‖ rand) mod p` given `content mod p`, without re-reducing the
/// whole content for every round.
pub fn bind_round(content: Fr, rand_this_round: &[u8]) -> Fr {
    let shift = Fr::from(256u64).pow([rand_this_round.len() as u64]);
    content * shift + Fr::from_be_bytes_mod_order(rand_this_round)
}

/// Number of indices challenged out of `n` held slices.
pub fn select_num(n: usize, max_index_num: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let k = ((n - 1) as f64).sqrt() as usize + 1;
    k.min(max_index_num.max(1)).min(n)
}

// =============================================================================
// Protocol
// =============================================================================

impl PairingParams {
    pub fn new() -> Self {
        Self {
            g1: G1Projective::generator(),
            g2: G2Projective::generator(),
        }
    }

    /// Generate an owner key pair.
    pub fn generate_key_pair(&self) -> (PdpPrivateKey, PdpPublicKey) {
        let x = random_nonzero_scalar();
        (PdpPrivateKey(x), PdpPublicKey(self.g2 * x))
    }

    pub fn public_key(&self, sk: &PdpPrivateKey) -> PdpPublicKey {
        PdpPublicKey(self.g2 * sk.0)
    }

    /// `H(v‖i)`: hash a length-prefixed encoding of `(v, i)` to a scalar and
    /// multiply the generator.
    pub fn hash_index(&self, rand_v: &Fr, index: u64) -> G1Projective {
        let v = scalar_to_bytes(rand_v);
        let digest = sha256_concat(&[
            &(v.len() as u32).to_be_bytes(),
            &v,
            &index.to_be_bytes(),
        ]);
        self.g1 * Fr::from_be_bytes_mod_order(&digest)
    }

    /// Per-round randomness only the owner can produce.
    pub fn round_randomness(&self, round: i64, sk: &PdpPrivateKey) -> Result<Vec<u8>> {
        if round < 0 {
            return Err(Error::param("negative challenge round"));
        }
        let point = self.g1 * (Fr::from(round as u64) * sk.0);
        Ok(sha256(&g1_to_bytes(&point)?).to_vec())
    }

    /// Tag one slice for one round.
    pub fn calculate_sigma_i(
        &self,
        content: &[u8],
        index: u64,
        rand_v: &[u8],
        rand_u: &[u8],
        sk: &PdpPrivateKey,
        round: i64,
    ) -> Result<Vec<u8>> {
        let table = self.sigma_table(content, index, rand_v, rand_u, sk, round..=round)?;
        table
            .into_values()
            .next()
            .ok_or_else(|| Error::internal("empty sigma table"))
    }

    /// Tag one slice for every round in `rounds`.
    pub fn sigma_table(
        &self,
        content: &[u8],
        index: u64,
        rand_v: &[u8],
        rand_u: &[u8],
        sk: &PdpPrivateKey,
        rounds: RangeInclusive<i64>,
    ) -> Result<BTreeMap<i64, Vec<u8>>> {
        if content.is_empty() {
            return Err(Error::param("empty slice content"));
        }
        let v = scalar_from_bytes(rand_v)?;
        let u = scalar_from_bytes(rand_u)?;
        let h = self.hash_index(&v, index);
        let base = content_scalar(content);

        let mut table = BTreeMap::new();
        for round in rounds {
            let rand = self.round_randomness(round, sk)?;
            let m = bind_round(base, &rand);
            let sigma = (h + self.g1 * (m * u)) * sk.0;
            table.insert(round, g1_to_bytes(&sigma)?);
        }
        Ok(table)
    }

    /// Pick a random subset of the held indices and per-index coefficients.
    pub fn generate_challenge(
        &self,
        index_list: &[u64],
        round: i64,
        sk: &PdpPrivateKey,
        max_index_num: usize,
    ) -> Result<PairingChallenge> {
        if index_list.is_empty() {
            return Err(Error::param("empty index list"));
        }
        let k = select_num(index_list.len(), max_index_num);
        let mut rng = rand::thread_rng();
        let positions = sample(&mut rng, index_list.len(), k);

        let mut indices = Vec::with_capacity(k);
        let mut vs = Vec::with_capacity(k);
        for pos in positions.iter() {
            indices.push(index_list[pos]);
            vs.push(random_scalar_bytes());
        }
        Ok(PairingChallenge {
            indices,
            vs,
            round,
            rand_this_round: self.round_randomness(round, sk)?,
        })
    }

    /// Peer side: aggregate the tags and contents named by a challenge.
    pub fn prove(
        &self,
        contents: &[Vec<u8>],
        vs: &[Vec<u8>],
        sigmas: &[Vec<u8>],
        rand_this_round: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        if contents.is_empty() || contents.len() != vs.len() || vs.len() != sigmas.len() {
            return Err(Error::param(format!(
                "mismatched proof inputs: {} contents, {} coefficients, {} sigmas",
                contents.len(),
                vs.len(),
                sigmas.len()
            )));
        }

        let mut sigma = G1Projective::zero();
        let mut mu = Fr::zero();
        for ((content, v), s) in contents.iter().zip(vs).zip(sigmas) {
            let v = scalar_from_bytes(v)?;
            sigma += g1_from_bytes(s)? * v;
            mu += v * bind_round(content_scalar(content), rand_this_round);
        }
        Ok((g1_to_bytes(&sigma)?, g1_to_bytes(&(self.g1 * mu))?))
    }

    /// Verifier side: check the pairing equation.
    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &self,
        indices: &[u64],
        vs: &[Vec<u8>],
        sigma: &[u8],
        mu: &[u8],
        rand_v: &[u8],
        rand_u: &[u8],
        pubkey: &[u8],
    ) -> Result<bool> {
        if indices.is_empty() || indices.len() != vs.len() {
            return Err(Error::param("mismatched challenge indices and coefficients"));
        }
        let sigma = g1_from_bytes(sigma)?;
        let mu = g1_from_bytes(mu)?;
        let v = scalar_from_bytes(rand_v)?;
        let u = scalar_from_bytes(rand_u)?;
        let pk = PdpPublicKey::from_bytes(pubkey)?;

        let mut agg = G1Projective::zero();
        for (index, vi) in indices.iter().zip(vs) {
            agg += self.hash_index(&v, *index) * scalar_from_bytes(vi)?;
        }
        agg += mu * u;

        let left = Bls12_381::pairing(sigma.into_affine(), self.g2.into_affine());
        let right = Bls12_381::pairing(agg.into_affine(), pk.0.into_affine());
        Ok(marshal(&left)? == marshal(&right)?)
    }
}

fn marshal<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value
        .serialize_compressed(&mut buf)
        .map_err(|e| Error::crypto(format!("failed to marshal pairing output: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Fixture {
        params: PairingParams,
        sk: PdpPrivateKey,
        pk: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    }

    fn fixture() -> Fixture {
        let params = PairingParams::new();
        let (sk, pk) = params.generate_key_pair();
        Fixture {
            pk: pk.to_bytes().unwrap(),
            params,
            sk,
            u: random_scalar_bytes(),
            v: random_scalar_bytes(),
        }
    }

    fn slices() -> Vec<Vec<u8>> {
        (1..=4u8).map(|i| vec![i; 257]).collect()
    }

    fn answer(f: &Fixture, contents: &[Vec<u8>], round: i64, tag_round: i64) -> bool {
        let indices: Vec<u64> = (1..=contents.len() as u64).collect();
        let chal = f
            .params
            .generate_challenge(&indices, round, &f.sk, 4)
            .unwrap();
        let original = slices();
        let mut picked = Vec::new();
        let mut sigmas = Vec::new();
        for idx in &chal.indices {
            let pos = (*idx - 1) as usize;
            picked.push(contents[pos].clone());
            sigmas.push(
                f.params
                    .calculate_sigma_i(&original[pos], *idx, &f.v, &f.u, &f.sk, tag_round)
                    .unwrap(),
            );
        }
        let (sigma, mu) = f
            .params
            .prove(&picked, &chal.vs, &sigmas, &chal.rand_this_round)
            .unwrap();
        f.params
            .verify(&chal.indices, &chal.vs, &sigma, &mu, &f.v, &f.u, &f.pk)
            .unwrap()
    }

    #[test]
    fn test_select_num() {
        assert_eq!(select_num(0, 5), 0);
        assert_eq!(select_num(1, 5), 1);
        assert_eq!(select_num(2, 5), 2);
        assert_eq!(select_num(4, 5), 2);
        assert_eq!(select_num(10, 5), 4);
        assert_eq!(select_num(100, 5), 5);
    }

    #[test]
    fn test_honest_proof_verifies() {
        let f = fixture();
        assert!(answer(&f, &slices(), 42, 42));
    }

    #[test]
    fn test_corrupted_content_fails() {
        let f = fixture();
        let mut corrupted = slices();
        for slice in corrupted.iter_mut() {
            slice[100] ^= 0xff;
        }
        assert!(!answer(&f, &corrupted, 42, 42));
    }

    #[test]
    fn test_prior_round_tags_fail() {
        let f = fixture();
        assert!(!answer(&f, &slices(), 42, 41));
    }

    #[test]
    fn test_bind_round_matches_concatenation() {
        let content = vec![0xabu8; 70];
        let rand = vec![0x11u8; 32];
        let mut joined = content.clone();
        joined.extend_from_slice(&rand);
        assert_eq!(
            bind_round(content_scalar(&content), &rand),
            Fr::from_be_bytes_mod_order(&joined)
        );
    }

    #[test]
    fn test_challenge_indices_are_distinct_and_held() {
        let f = fixture();
        let held = vec![2u64, 5, 9, 11, 12, 30];
        let chal = f.params.generate_challenge(&held, 7, &f.sk, 5).unwrap();
        assert_eq!(chal.indices.len(), select_num(held.len(), 5));
        let mut seen = chal.indices.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), chal.indices.len());
        assert!(chal.indices.iter().all(|i| held.contains(i)));
    }

    #[test]
    fn test_prove_rejects_mismatched_inputs() {
        let f = fixture();
        let err = f
            .params
            .prove(&slices(), &[random_scalar_bytes()], &[], &[1, 2, 3])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);
        let err = f.params.prove(&[], &[], &[], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);
    }

    #[test]
    fn test_scalar_encoding_rejects_out_of_range() {
        assert!(scalar_from_bytes(&[0xff; 32]).is_err());
        let s = random_scalar_bytes();
        assert_eq!(scalar_to_bytes(&scalar_from_bytes(&s).unwrap()), s);
    }

    #[test]
    fn test_key_encoding() {
        let f = fixture();
        let restored = PdpPrivateKey::from_bytes(&f.sk.to_bytes()).unwrap();
        assert_eq!(
            f.params.public_key(&restored).to_bytes().unwrap(),
            f.pk
        );
    }
}
