//! End to end flows: a multi-party requirement is registered, shipped to verifiers in its
//! wire forms, and checked against signatures; a batch of transactions is signed once and
//! each transaction is proven individually.
use composite_keys::batch::BatchSigner;
use composite_keys::common::{Hash, PublicKey, StandardDigests};
use composite_keys::composite::{Builder, CompositeKey, Key};
use composite_keys::composite_signature::{verify_composite, DigitalSignature};
use composite_keys::ed25519::{Ed25519Signer, Ed25519Verifier};
use composite_keys::errors::Error;
use composite_keys::key_utils::{find_my_signing_keys, is_key_in_set};
use composite_keys::merkle::MerkleTree;
use composite_keys::partial::PartialMerkleTree;
use composite_keys::traits::Signer;
use std::collections::BTreeSet;

struct Party {
    signer: Ed25519Signer,
}

impl Party {
    fn new(seed: u8) -> Self {
        Party {
            signer: Ed25519Signer::keygen(&mut [seed; 32]),
        }
    }

    fn key(&self) -> PublicKey {
        self.signer.public_key()
    }
}

#[test]
fn and_or_nested() {
    let (alice, bob, charlie) = (Party::new(1), Party::new(2), Party::new(3));

    let and = CompositeKey::create(vec![(alice.key().into(), 1), (bob.key().into(), 1)], None)
        .unwrap();
    assert!(!and.is_fulfilled_by([&alice.key()]));
    assert!(and.is_fulfilled_by([&alice.key(), &bob.key()]));

    let or = CompositeKey::create(
        vec![(alice.key().into(), 1), (bob.key().into(), 1)],
        Some(1),
    )
    .unwrap();
    assert!(or.is_fulfilled_by([&alice.key()]));

    let nested = CompositeKey::create(vec![(and.into(), 1), (charlie.key().into(), 1)], Some(1))
        .unwrap();
    assert!(nested.is_fulfilled_by([&charlie.key()]));
    assert!(!nested.is_fulfilled_by([&alice.key()]));
    assert!(nested.is_fulfilled_by([&alice.key(), &bob.key()]));
}

#[test]
fn zero_weight_is_refused() {
    let alice = Party::new(1);
    assert_eq!(
        Builder::new().add_key(alice.key(), 0).build(),
        Err(Error::InvalidWeight(0))
    );
}

#[test]
fn two_leaf_merkle_proof() {
    let leaves = vec![Hash::sha256(b"d"), Hash::sha256(b"f")];
    let tree = MerkleTree::build(leaves.clone(), &StandardDigests).unwrap();
    let proof = PartialMerkleTree::build(&tree, &leaves).unwrap();
    assert!(proof.verify(tree.root(), &leaves, &StandardDigests).is_ok());

    let mut bytes = leaves[0].as_bytes().to_vec();
    bytes[31] ^= 0x80;
    let altered = vec![Hash::new("SHA-256", bytes).unwrap(), leaves[1].clone()];
    assert_eq!(
        proof.verify(tree.root(), &altered, &StandardDigests),
        Err(Error::ProofVerificationFailed)
    );
}

#[test]
fn back_reference_on_the_wire_is_a_cycle() {
    let (alice, bob) = (Party::new(1), Party::new(2));
    let sub = CompositeKey::create(vec![(alice.key().into(), 1), (bob.key().into(), 1)], Some(1))
        .unwrap();
    let tree = CompositeKey::create(vec![(sub.into(), 1), (alice.key().into(), 1)], Some(1))
        .unwrap();
    let mut table = tree.to_node_table().unwrap();

    // Node 1 is the nested level. Its first child (weight 1, one of the leaves) is
    // rewritten into a reference to the root.
    let node1 = table.len() - (4 + 1 + 2 * (4 + 1 + 1 + 2 + 32));
    let child = node1 + 4 + 1;
    let mut forged = table[..child + 4].to_vec();
    forged.extend_from_slice(&[1, 0, 0, 0, 0]);
    forged.extend_from_slice(&table[child + 4 + 1 + 1 + 2 + 32..]);
    table = forged;

    assert_eq!(
        CompositeKey::from_node_table(&table),
        Err(Error::CycleDetected)
    );
}

#[test]
fn registered_requirement_verified_from_certificate() {
    let assistants: Vec<_> = (1..=3).map(Party::new).collect();
    let ceo = Party::new(9);

    // 2 of 3 assistants OR the CEO
    let two_of_three = Builder::new()
        .add_keys(assistants.iter().map(Party::key))
        .build_with_threshold(2)
        .unwrap();
    let policy = Builder::new()
        .add_key(two_of_three, 1)
        .add_key(ceo.key(), 1)
        .build_with_threshold(1)
        .unwrap();

    let extension = policy.to_extension().unwrap();
    let received = Key::from(CompositeKey::from_extension(&extension).unwrap());

    let message = b"move 100 units to the treasury";
    let by = |p: &Party| DigitalSignature::sign(&p.signer, message);

    assert!(verify_composite(&received, &[by(&ceo)], message, &Ed25519Verifier).is_ok());
    assert!(verify_composite(
        &received,
        &[by(&assistants[0]), by(&assistants[2])],
        message,
        &Ed25519Verifier
    )
    .is_ok());
    assert_eq!(
        verify_composite(&received, &[by(&assistants[1])], message, &Ed25519Verifier),
        Err(Error::ThresholdNotMet)
    );
}

#[test]
fn wallet_finds_what_it_can_sign() {
    let (alice, bob, carol) = (Party::new(1), Party::new(2), Party::new(3));
    let shared = Key::from(
        CompositeKey::create(vec![(alice.key().into(), 1), (bob.key().into(), 1)], None)
            .unwrap(),
    );
    let candidates = vec![shared.clone(), Key::from(carol.key()), Key::from(alice.key())];

    let wallet: BTreeSet<PublicKey> = [bob.key()].into_iter().collect();
    let found = find_my_signing_keys(&candidates, &wallet).unwrap();
    assert_eq!(found[&shared], Some(bob.key()));
    assert_eq!(found[&Key::from(carol.key())], None);
    assert_eq!(found[&Key::from(alice.key())], None);

    assert!(is_key_in_set(&shared, [&bob.key()]));
    assert!(!is_key_in_set(&shared, [&carol.key()]));
}

#[test]
fn batch_of_transactions() {
    let notary = Party::new(42);
    let transactions: Vec<Hash> = (0..10)
        .map(|i| Hash::sha256(format!("transaction {}", i).as_bytes()))
        .collect();

    let batch = BatchSigner::new(&notary.signer, &StandardDigests)
        .sign_batch(transactions.clone())
        .unwrap();

    for (tx, proof) in transactions.iter().zip(batch.proofs().unwrap()) {
        assert_eq!(proof.signature().by(), &notary.key());
        assert!(proof.verify(tx, &Ed25519Verifier, &StandardDigests).is_ok());
    }

    let stranger = Hash::sha256(b"not in the batch");
    let proof = batch.proof_for(&transactions[3]).unwrap();
    assert_eq!(
        proof.verify(&stranger, &Ed25519Verifier, &StandardDigests),
        Err(Error::ProofVerificationFailed)
    );
}

#[test]
fn batch_with_repeated_transactions() {
    let notary = Party::new(42);
    let (a, b) = (Hash::sha256(b"pay 5"), Hash::sha256(b"pay 7"));
    let transactions = vec![a.clone(), b.clone(), a.clone(), a.clone(), b];

    let batch = BatchSigner::new(&notary.signer, &StandardDigests)
        .sign_batch(transactions.clone())
        .unwrap();

    for (tx, proof) in transactions.iter().zip(batch.proofs().unwrap()) {
        assert!(proof.verify(tx, &Ed25519Verifier, &StandardDigests).is_ok());
    }
    assert!(batch
        .proof_for(&a)
        .unwrap()
        .verify(&a, &Ed25519Verifier, &StandardDigests)
        .is_ok());
}
