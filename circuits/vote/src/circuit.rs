//! Vote circuit
//!
//! Public Inputs:
//! - nullifier_hash: Poseidon(voter, election)
//! - commitment_hash: Poseidon(voter, candidate, election, salt)
//! - election_root: eligibility root the vote was cast against
//!
//! Private Witnesses:
//! - voter, candidate, election: field-encoded identifiers
//! - salt: per-vote randomness
//! - election_root: copy of the public root
//!
//! Constraints:
//! 1. nullifier_hash == Poseidon(voter, election)
//! 2. commitment_hash == Poseidon(voter, candidate, election, salt)
//! 3. election_root witness == public election_root

use halo2_gadgets::poseidon::{
    primitives::{ConstantLength, P128Pow5T3},
    Hash as PoseidonHash, Pow5Chip, Pow5Config,
};
use halo2_proofs::{
    circuit::{AssignedCell, Chip, Layouter, SimpleFloorPlanner, Value},
    plonk::{Advice, Circuit, Column, ConstraintSystem, Error, Instance},
};
use halo2curves::pasta::Fp;
use zkballot_runtime::{
    BallotError, CandidateId, CommitmentHash, ElectionContext, ElectionRoot, NullifierHash,
    PublicSignals, Result, Salt, VoterId, COMMITMENT_INDEX, ELECTION_ROOT_INDEX, NULLIFIER_INDEX,
};

use crate::commitment::{self, POSEIDON_RATE, POSEIDON_WIDTH};

/// Name under which the circuit's artifacts are published
pub const CIRCUIT_NAME: &str = "vote";

/// Smallest `k` (2^k rows) that fits three Poseidon permutations
pub const MIN_K: u32 = 8;

#[derive(Clone, Debug)]
pub struct VoteConfig {
    advice: [Column<Advice>; 4],
    instance: Column<Instance>,
    poseidon: Pow5Config<Fp, POSEIDON_WIDTH, POSEIDON_RATE>,
}

#[derive(Clone, Debug)]
pub struct VoteChip {
    config: VoteConfig,
}

impl Chip<Fp> for VoteChip {
    type Config = VoteConfig;
    type Loaded = ();

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn loaded(&self) -> &Self::Loaded {
        &()
    }
}

/// Private witnesses once assigned
#[derive(Clone, Debug)]
pub struct PrivateCells {
    pub voter: AssignedCell<Fp, Fp>,
    pub candidate: AssignedCell<Fp, Fp>,
    pub election: AssignedCell<Fp, Fp>,
    pub salt: AssignedCell<Fp, Fp>,
    pub election_root: AssignedCell<Fp, Fp>,
}

impl VoteChip {
    pub fn construct(config: VoteConfig) -> Self {
        Self { config }
    }

    /// `advice[0..3]` carry the Poseidon state, `advice[3]` its partial S-box.
    pub fn configure(
        meta: &mut ConstraintSystem<Fp>,
        advice: [Column<Advice>; 4],
        instance: Column<Instance>,
    ) -> VoteConfig {
        for col in &advice {
            meta.enable_equality(*col);
        }
        meta.enable_equality(instance);

        let rc_a = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        let rc_b = [meta.fixed_column(), meta.fixed_column(), meta.fixed_column()];
        // Constant-length padding is loaded from here
        meta.enable_constant(rc_b[0]);

        let poseidon = Pow5Chip::configure::<P128Pow5T3>(
            meta,
            [advice[0], advice[1], advice[2]],
            advice[3],
            rc_a,
            rc_b,
        );

        VoteConfig { advice, instance, poseidon }
    }

    pub fn assign_private(
        &self,
        mut layouter: impl Layouter<Fp>,
        circuit: &VoteCircuit,
    ) -> std::result::Result<PrivateCells, Error> {
        layouter.assign_region(
            || "private inputs",
            |mut region| {
                let voter =
                    region.assign_advice(|| "voter", self.config.advice[0], 0, || circuit.voter)?;
                let candidate = region.assign_advice(
                    || "candidate",
                    self.config.advice[1],
                    0,
                    || circuit.candidate,
                )?;
                let election = region.assign_advice(
                    || "election",
                    self.config.advice[2],
                    0,
                    || circuit.election,
                )?;
                let salt =
                    region.assign_advice(|| "salt", self.config.advice[0], 1, || circuit.salt)?;
                let election_root = region.assign_advice(
                    || "election_root",
                    self.config.advice[1],
                    1,
                    || circuit.election_root,
                )?;

                Ok(PrivateCells { voter, candidate, election, salt, election_root })
            },
        )
    }

    /// In-circuit Poseidon matching [`commitment::poseidon_hash`].
    pub fn hash<const L: usize>(
        &self,
        mut layouter: impl Layouter<Fp>,
        message: [AssignedCell<Fp, Fp>; L],
    ) -> std::result::Result<AssignedCell<Fp, Fp>, Error> {
        let pow5 = Pow5Chip::construct(self.config.poseidon.clone());
        let hasher = PoseidonHash::<
            _,
            _,
            P128Pow5T3,
            ConstantLength<L>,
            POSEIDON_WIDTH,
            POSEIDON_RATE,
        >::init(pow5, layouter.namespace(|| "init"))?;

        hasher.hash(layouter.namespace(|| "absorb and squeeze"), message)
    }
}

#[derive(Clone, Debug)]
pub struct VoteCircuit {
    pub voter: Value<Fp>,
    pub candidate: Value<Fp>,
    pub election: Value<Fp>,
    pub salt: Value<Fp>,
    pub election_root: Value<Fp>,
}

impl Default for VoteCircuit {
    fn default() -> Self {
        Self {
            voter: Value::unknown(),
            candidate: Value::unknown(),
            election: Value::unknown(),
            salt: Value::unknown(),
            election_root: Value::unknown(),
        }
    }
}

impl Circuit<Fp> for VoteCircuit {
    type Config = VoteConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        Self::default()
    }

    fn configure(meta: &mut ConstraintSystem<Fp>) -> Self::Config {
        let advice = [(); 4].map(|_| meta.advice_column());
        let instance = meta.instance_column();

        VoteChip::configure(meta, advice, instance)
    }

    fn synthesize(
        &self,
        config: Self::Config,
        mut layouter: impl Layouter<Fp>,
    ) -> std::result::Result<(), Error> {
        let chip = VoteChip::construct(config.clone());

        let private = chip.assign_private(layouter.namespace(|| "private inputs"), self)?;

        // 1. nullifier = H(voter, election)
        let nullifier = chip.hash(
            layouter.namespace(|| "nullifier"),
            [private.voter.clone(), private.election.clone()],
        )?;

        // 2. commitment = H(voter, candidate, election, salt)
        let commitment = chip.hash(
            layouter.namespace(|| "commitment"),
            [private.voter, private.candidate, private.election, private.salt],
        )?;

        // Expose public inputs
        layouter.constrain_instance(nullifier.cell(), config.instance, NULLIFIER_INDEX)?;
        layouter.constrain_instance(commitment.cell(), config.instance, COMMITMENT_INDEX)?;
        layouter.constrain_instance(
            private.election_root.cell(),
            config.instance,
            ELECTION_ROOT_INDEX,
        )?;

        Ok(())
    }
}

/// Fully typed input of one vote proof: the four private values plus the
/// public outputs the circuit is expected to reproduce.
#[derive(Clone, Debug)]
pub struct VoteCircuitInput {
    voter: VoterId,
    candidate: CandidateId,
    context: ElectionContext,
    salt: Salt,
    nullifier_hash: NullifierHash,
    commitment_hash: CommitmentHash,
}

impl VoteCircuitInput {
    /// Assembles an input from already computed public outputs.
    pub fn assemble(
        voter: VoterId,
        candidate: CandidateId,
        context: ElectionContext,
        salt: Salt,
        nullifier_hash: NullifierHash,
        commitment_hash: CommitmentHash,
    ) -> Self {
        Self { voter, candidate, context, salt, nullifier_hash, commitment_hash }
    }

    /// Derives both hashes with the commitment engine and assembles the input.
    pub fn derive(
        voter: VoterId,
        candidate: CandidateId,
        context: ElectionContext,
        salt: Salt,
    ) -> Self {
        let nullifier_hash = commitment::nullifier_hash(&voter, context.election());
        let commitment_hash =
            commitment::commitment_hash(&voter, &candidate, context.election(), &salt);
        Self::assemble(voter, candidate, context, salt, nullifier_hash, commitment_hash)
    }

    /// Checks, before any proving work, that the declared public outputs are
    /// the ones the circuit will derive from the private values.
    pub fn validate(&self) -> Result<()> {
        if bool::from(ff::Field::is_zero(&self.salt.element())) {
            return Err(BallotError::invalid_input("salt must not be zero"));
        }

        let expected_nullifier = commitment::nullifier_hash(&self.voter, self.context.election());
        if expected_nullifier != self.nullifier_hash {
            return Err(BallotError::invalid_input(
                "declared nullifier hash does not match voter and election",
            ));
        }

        let expected_commitment = commitment::commitment_hash(
            &self.voter,
            &self.candidate,
            self.context.election(),
            &self.salt,
        );
        if expected_commitment != self.commitment_hash {
            return Err(BallotError::invalid_input(
                "declared commitment hash does not match the private inputs",
            ));
        }

        Ok(())
    }

    pub fn nullifier_hash(&self) -> NullifierHash {
        self.nullifier_hash
    }

    pub fn commitment_hash(&self) -> CommitmentHash {
        self.commitment_hash
    }

    pub fn election_root(&self) -> ElectionRoot {
        self.context.root()
    }

    pub fn context(&self) -> &ElectionContext {
        &self.context
    }

    pub fn public_signals(&self) -> PublicSignals {
        PublicSignals::for_vote(self.nullifier_hash, self.commitment_hash, self.context.root())
    }

    pub fn circuit(&self) -> VoteCircuit {
        VoteCircuit {
            voter: Value::known(self.voter.element()),
            candidate: Value::known(self.candidate.element()),
            election: Value::known(self.context.election().element()),
            salt: Value::known(self.salt.element()),
            election_root: Value::known(self.context.root().element()),
        }
    }
}
