//! Test vector generator for the Cloak payment core.
//!
//! Writes `tests/fixtures/test_vectors.json` with the commitment, amount
//! normalization, Merkle and disclosure vectors that any compatible
//! implementation must reproduce byte for byte.
//!
//! Usage:
//!   cloak-testvec              # Generate test_vectors.json
//!   cloak-testvec --verify     # Check test_vectors.json against this build

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use cloak_accumulator::tree;
use cloak_crypto::hash::{self, Domain};
use cloak_crypto::keys::SigningKey;
use cloak_proof::{Ed25519Disclosure, ProofService};
use cloak_types::{Amount, Commitment, Digest, Nullifier, Secret};
use serde::{Deserialize, Serialize};

const FIXTURE_PATH: &str = "tests/fixtures/test_vectors.json";

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn vector(description: &str, inputs: &[(&str, String)], outputs: &[(&str, String)]) -> TestVector {
    let collect = |pairs: &[(&str, String)]| {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>()
    };
    TestVector {
        description: description.to_string(),
        inputs: collect(inputs),
        outputs: collect(outputs),
    }
}

fn generate_context_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    for domain in Domain::ALL {
        let context = domain.context();
        let key = domain.derive_key(&[0u8; 32]);
        let name = context.trim_start_matches("Cloak v1 ").replace('-', "_");
        vectors.insert(
            format!("blake3_derive_key_{name}"),
            vector(
                &format!("BLAKE3::derive_key(\"{context}\", 0x00*32)"),
                &[
                    ("context", context.to_string()),
                    ("key_material", hex::encode([0u8; 32])),
                ],
                &[("derived_key", hex::encode(key))],
            ),
        );
    }

    vectors
}

fn generate_commitment_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let cases = [
        ("commitment_basic", [0x01u8; 32], [0x02u8; 32], "0.05"),
        ("commitment_integer_amount", [0x01u8; 32], [0x02u8; 32], "1"),
        ("commitment_smallest_unit", [0xffu8; 32], [0x00u8; 32], "0.000000000000000001"),
    ];
    for (name, secret, nullifier, amount) in cases {
        let secret = Secret::from_bytes(secret);
        let nullifier = Nullifier::from_bytes(nullifier);
        let parsed = Amount::parse(amount)?;
        let commitment = cloak_commitment::commit(&secret, &parsed, &nullifier);
        vectors.insert(
            name.to_string(),
            vector(
                "derive_key(\"Cloak v1 payment-commitment\", fields(secret, nullifier, canonical(amount)))",
                &[
                    ("secret", secret.expose_hex()),
                    ("nullifier", nullifier.to_hex()),
                    ("amount", amount.to_string()),
                ],
                &[
                    ("canonical_amount", parsed.canonical()),
                    ("commitment", commitment.to_hex()),
                    (
                        "shareable_link",
                        cloak_commitment::link::shareable_link(
                            cloak_commitment::link::DEFAULT_BASE_URL,
                            &commitment,
                        ),
                    ),
                ],
            ),
        );
    }

    Ok(vectors)
}

fn generate_amount_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    for (name, input) in [
        ("amount_leading_dot", ".05"),
        ("amount_trailing_zero", "0.050"),
        ("amount_whole", "12"),
        ("amount_trailing_dot", "7."),
        ("amount_max_precision", "1.123456789012345678"),
    ] {
        let amount = Amount::parse(input)?;
        vectors.insert(
            name.to_string(),
            vector(
                "Decimal amount normalized to minor units (10^-18)",
                &[("input", input.to_string())],
                &[
                    ("canonical", amount.canonical()),
                    ("decimal", amount.to_decimal()),
                ],
            ),
        );
    }

    Ok(vectors)
}

fn generate_merkle_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let inner = hash::merkle_inner(&[0u8; 32], &[0u8; 32]);
    vectors.insert(
        "merkle_inner_zero".to_string(),
        vector(
            "merkle_inner(0x00*32, 0x00*32)",
            &[
                ("left", hex::encode([0u8; 32])),
                ("right", hex::encode([0u8; 32])),
            ],
            &[("node", hex::encode(inner))],
        ),
    );

    for count in [1usize, 2, 3, 5, 8] {
        let leaves: Vec<Digest> = (1..=count).map(|i| [i as u8; 32]).collect();
        let root = tree::compute_root(&leaves);
        let last = count - 1;
        let proof = tree::build_proof(&leaves, last)?;
        let siblings: Vec<String> = proof.siblings.iter().map(hex::encode).collect();
        vectors.insert(
            format!("merkle_root_{count}_leaves"),
            vector(
                "Merkle root over leaves [i; 32] for i in 1..=n, odd nodes paired with themselves",
                &[
                    ("leaf_count", count.to_string()),
                    ("proof_index", last.to_string()),
                ],
                &[
                    ("root", hex::encode(root)),
                    ("proof_siblings", siblings.join(",")),
                ],
            ),
        );
    }

    Ok(vectors)
}

fn generate_disclosure_vector() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let secret = Secret::from_bytes([0x01u8; 32]);
    let nullifier = Nullifier::from_bytes([0x02u8; 32]);
    let amount = Amount::parse("0.05")?;
    let commitment: Commitment = cloak_commitment::commit(&secret, &amount, &nullifier);
    let disclosure = Ed25519Disclosure::new();
    let key = disclosure.disclosure_key(&secret);
    let proof = disclosure.generate_disclosure_proof(&secret, &commitment, &amount)?;

    vectors.insert(
        "disclosure_ed25519".to_string(),
        vector(
            "Disclosure proof: key = derive_key(\"Cloak v1 disclosure-key\", secret), signature over commitment and amount",
            &[
                ("secret", secret.expose_hex()),
                ("commitment", commitment.to_hex()),
                ("amount", amount.to_decimal()),
            ],
            &[
                ("scheme", proof.scheme.clone()),
                ("disclosure_key", hex::encode(key.as_bytes())),
                ("proof", hex::encode(&proof.bytes)),
            ],
        ),
    );

    Ok(vectors)
}

/// RFC 8032 section 7.1 TEST 1 secret key.
const RFC8032_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

fn generate_ed25519_vectors() -> anyhow::Result<BTreeMap<String, TestVector>> {
    let mut vectors = BTreeMap::new();

    let mut seed = [0u8; 32];
    hex::decode_to_slice(RFC8032_SEED, &mut seed)?;
    let key = SigningKey::from_seed(&seed);
    let public = key.verifying_key();
    let sig = key.sign(b"");
    vectors.insert(
        "ed25519_rfc8032_test1".to_string(),
        vector(
            "RFC 8032 7.1 TEST 1 key, empty message, and its wallet address",
            &[
                ("secret_key", RFC8032_SEED.to_string()),
                ("message", String::new()),
            ],
            &[
                ("public_key", hex::encode(public.to_bytes())),
                ("signature", hex::encode(sig.to_bytes())),
                ("address", public.address()),
            ],
        ),
    );

    Ok(vectors)
}

fn generate_all_vectors() -> anyhow::Result<TestVectors> {
    let mut all_vectors = BTreeMap::new();

    all_vectors.extend(generate_context_vectors());
    all_vectors.extend(generate_commitment_vectors()?);
    all_vectors.extend(generate_amount_vectors()?);
    all_vectors.extend(generate_merkle_vectors()?);
    all_vectors.extend(generate_disclosure_vector()?);
    all_vectors.extend(generate_ed25519_vectors()?);

    Ok(TestVectors {
        version: "1.0".to_string(),
        generated_by: "cloak-testvec".to_string(),
        vectors: all_vectors,
    })
}

fn verify_vectors(vectors: &TestVectors) -> anyhow::Result<bool> {
    let regenerated = generate_all_vectors()?;
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => eprintln!("PASS: {name}"),
            Some(actual) => {
                eprintln!("FAIL: {name}");
                eprintln!("  expected: {:?}", expected.outputs);
                eprintln!("  actual:   {:?}", actual.outputs);
                all_pass = false;
            }
            None => {
                eprintln!("MISSING: {name}");
                all_pass = false;
            }
        }
    }

    Ok(all_pass)
}

fn write_vectors(vectors: &TestVectors) -> anyhow::Result<()> {
    let path = Path::new(FIXTURE_PATH);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(vectors)?;
    std::fs::write(path, json).with_context(|| format!("writing {FIXTURE_PATH}"))?;
    eprintln!("Generated {} test vectors to {FIXTURE_PATH}", vectors.vectors.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let verify = std::env::args().any(|a| a == "--verify");

    let vectors = if verify && Path::new(FIXTURE_PATH).exists() {
        let content = std::fs::read_to_string(FIXTURE_PATH)
            .with_context(|| format!("reading {FIXTURE_PATH}"))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {FIXTURE_PATH}"))?
    } else {
        if verify {
            eprintln!("No existing test vectors found at {FIXTURE_PATH}. Generating...");
        }
        let vectors = generate_all_vectors()?;
        write_vectors(&vectors)?;
        vectors
    };

    if verify_vectors(&vectors)? {
        eprintln!("All test vectors verified successfully.");
        Ok(())
    } else {
        anyhow::bail!("test vector verification failed")
    }
}
