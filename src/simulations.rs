//! Wright-Fisher style models of a diploid, biallelic (A/a) population.
//!
//! Each generation an offspring population of fixed size is drawn by a genotype lottery
//! over Hardy-Weinberg proportions, optionally weighted by genotype fitness. Mutation acts
//! on the parental allele pool, gene flow draws each deme's parents across demes first.
use std::{fmt, str::FromStr};

use ndarray::Array2;
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    errors::{SamplingError, SimulationError},
    migration::MigrationMatrix,
    sampling::{rbinomial_distribution, rmultinom, sample},
    trajectory::Trajectories,
};

/// Relative fitness of the genotypes `[AA, Aa, aa]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fitness(pub [f64; 3]);

impl Default for Fitness {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Fitness {
    pub fn neutral() -> Self {
        Self([1.0; 3])
    }

    fn validate(&self) -> Result<(), SimulationError> {
        if self.0.iter().any(|w| !w.is_finite() || *w < 0.0) || self.0.iter().all(|&w| w == 0.0)
        {
            return Err(SimulationError::InvalidParameter(format!(
                "fitness {:?} must be non-negative and not all zero",
                self.0
            )));
        }
        Ok(())
    }
}

/// Parses `"wAA,wAa,waa"`.
impl FromStr for Fitness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        match values[..] {
            [aa_dom, het, aa_rec] => Ok(Self([aa_dom, het, aa_rec])),
            _ => Err(format!(
                "expected three comma separated fitness values, got {}",
                values.len()
            )),
        }
    }
}

/// One diploid population, stored as genotype counts `[AA, Aa, aa]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deme {
    genotypes: [usize; 3],
}

impl Deme {
    /// Population of `size` individuals whose allele-A count is closest to `frequency`.
    /// Copies of A are packed into homozygotes first.
    pub fn from_frequency(size: usize, frequency: f64) -> Self {
        let copies = ((frequency * 2.0 * size as f64).round() as usize).min(2 * size);
        let homozygotes = copies / 2;
        let heterozygotes = copies % 2;

        Self {
            genotypes: [homozygotes, heterozygotes, size - homozygotes - heterozygotes],
        }
    }

    pub fn genotypes(&self) -> [usize; 3] {
        self.genotypes
    }

    pub fn size(&self) -> usize {
        self.genotypes.iter().sum()
    }

    /// Copies of allele A
    pub fn allele_count(&self) -> usize {
        2 * self.genotypes[0] + self.genotypes[1]
    }

    pub fn frequency(&self) -> f64 {
        self.allele_count() as f64 / (2 * self.size()) as f64
    }

    /// Allele-A frequency as seen by an observer.
    ///
    /// With `sample_size` set, the frequency is estimated from that many individuals picked
    /// without replacement; otherwise it is the census frequency.
    pub fn observe<R: RngCore>(
        &self,
        sample_size: Option<usize>,
        rng: &mut R,
    ) -> Result<f64, SamplingError> {
        let Some(sample_size) = sample_size else {
            return Ok(self.frequency());
        };

        // copies of A carried by each individual
        let individuals: Vec<usize> = self
            .genotypes
            .iter()
            .zip([2, 1, 0])
            .flat_map(|(&count, copies)| std::iter::repeat_n(copies, count))
            .collect();

        let picked = sample(&individuals, sample_size, false, rng)?;
        if picked.is_empty() {
            return Ok(self.frequency());
        }
        let copies: usize = picked.iter().map(|&i| individuals[i]).sum();

        Ok(copies as f64 / (2 * picked.len()) as f64)
    }
}

/// Genotype frequencies among offspring of a parental pool with allele-A frequency `p`.
fn genotype_probabilities(p: f64, fitness: &Fitness) -> Result<[f64; 3], SimulationError> {
    let q = 1.0 - p;
    let hardy_weinberg = [p * p, 2.0 * p * q, q * q];
    let weighted: [f64; 3] = std::array::from_fn(|i| hardy_weinberg[i] * fitness.0[i]);
    let mean_fitness: f64 = weighted.iter().sum();

    if mean_fitness <= 0.0 {
        return Err(SimulationError::InvalidParameter(format!(
            "mean fitness is zero at allele frequency {p}"
        )));
    }

    Ok(weighted.map(|w| w / mean_fitness))
}

/// Draw `size` offspring from a parental pool with allele-A frequency `p`.
fn reproduce<R: RngCore>(
    p: f64,
    size: usize,
    fitness: &Fitness,
    rng: &mut R,
) -> Result<Deme, SimulationError> {
    let probabilities = genotype_probabilities(p, fitness)?;
    let counts = rmultinom(1, size, &probabilities, rng)?;

    Ok(Deme {
        genotypes: [counts[[0, 0]], counts[[1, 0]], counts[[2, 0]]],
    })
}

/// Allele-A frequency of the parental pool after each copy mutates independently:
/// A to a with `forward_rate`, a to A with `backward_rate`.
fn mutate<R: RngCore>(
    deme: &Deme,
    forward_rate: f64,
    backward_rate: f64,
    rng: &mut R,
) -> Result<f64, SamplingError> {
    let total = 2 * deme.size();
    let copies = deme.allele_count();

    let lost = rbinomial_distribution(1, copies, forward_rate, rng)?[0];
    let gained = rbinomial_distribution(1, total - copies, backward_rate, rng)?[0];

    Ok((copies - lost + gained) as f64 / total as f64)
}

/// The evolutionary forces acting on the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Model {
    /// Neutral drift in isolated replicate populations
    Drift,
    Selection {
        fitness: Fitness,
    },
    Mutation {
        forward_rate: f64,
        backward_rate: f64,
    },
    /// Neutral island model with `demes` connected populations
    Flow {
        demes: usize,
        migration_rate: f64,
    },
    /// Island model where every deme has its own fitness values
    SelectionFlow {
        migration_rate: f64,
        fitness: Vec<Fitness>,
    },
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::Drift => "drift",
            Model::Selection { .. } => "selection",
            Model::Mutation { .. } => "mutation",
            Model::Flow { .. } => "flow",
            Model::SelectionFlow { .. } => "selection-flow",
        };
        write!(f, "{name}")
    }
}

fn default_replicates() -> usize {
    1
}

/// Full description of one simulation run; loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Diploid individuals per population
    pub population_size: usize,
    pub generations: usize,
    /// Starting frequency of allele A
    pub initial_frequency: f64,
    /// Independent populations for the isolated models; flow models use their demes instead
    #[serde(default = "default_replicates")]
    pub replicates: usize,
    /// Individuals observed per generation; `None` records census frequencies
    #[serde(default)]
    pub sample_size: Option<usize>,
    pub seed: u64,
    pub model: Model,
}

/// Output of [`Parameters::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub trajectories: Trajectories,
    /// Parents moved between demes over the whole run, indexed `[from][to]`
    pub migrations: Option<Array2<usize>>,
}

fn check_rate(name: &str, rate: f64) -> Result<(), SimulationError> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(SimulationError::InvalidParameter(format!(
            "{name} {rate} outside [0, 1]"
        )));
    }
    Ok(())
}

impl Parameters {
    /// A small selection run, handy as a config template.
    pub fn example() -> Self {
        Self {
            population_size: 100,
            generations: 50,
            initial_frequency: 0.5,
            replicates: 5,
            sample_size: None,
            seed: 42,
            model: Model::Selection {
                fitness: Fitness([1.0, 0.95, 0.9]),
            },
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.population_size == 0 {
            return Err(SimulationError::InvalidParameter(
                "population size must be positive".into(),
            ));
        }
        if self.replicates == 0 {
            return Err(SimulationError::InvalidParameter(
                "at least one replicate is required".into(),
            ));
        }
        check_rate("initial frequency", self.initial_frequency)?;
        if let Some(n) = self.sample_size {
            if n == 0 || n > self.population_size {
                return Err(SimulationError::InvalidParameter(format!(
                    "sample size {n} must be in 1..={}",
                    self.population_size
                )));
            }
        }

        match &self.model {
            Model::Drift => Ok(()),
            Model::Selection { fitness } => self.validate_fitness(fitness),
            Model::Mutation {
                forward_rate,
                backward_rate,
            } => {
                check_rate("forward mutation rate", *forward_rate)?;
                check_rate("backward mutation rate", *backward_rate)
            }
            Model::Flow {
                demes,
                migration_rate,
            } => {
                check_rate("migration rate", *migration_rate)?;
                if *demes < 2 {
                    return Err(SimulationError::InvalidParameter(format!(
                        "gene flow needs at least 2 demes, got {demes}"
                    )));
                }
                Ok(())
            }
            Model::SelectionFlow {
                migration_rate,
                fitness,
            } => {
                check_rate("migration rate", *migration_rate)?;
                if fitness.len() < 2 {
                    return Err(SimulationError::InvalidParameter(format!(
                        "selection-flow needs fitness values for at least 2 demes, got {}",
                        fitness.len()
                    )));
                }
                fitness.iter().try_for_each(|w| self.validate_fitness(w))
            }
        }
    }

    /// Fitness values must also leave a positive mean fitness at the starting frequency.
    fn validate_fitness(&self, fitness: &Fitness) -> Result<(), SimulationError> {
        fitness.validate()?;
        genotype_probabilities(self.initial_frequency, fitness).map(|_| ())
    }

    /// Run the model from a generator seeded with `seed`.
    pub fn run(&self) -> Result<SimulationRun, SimulationError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        info!(
            model = %self.model,
            population_size = self.population_size,
            generations = self.generations,
            seed = self.seed,
            "starting simulation"
        );

        let neutral = Fitness::neutral();
        match &self.model {
            Model::Drift => self.run_isolated(&neutral, None, &mut rng),
            Model::Selection { fitness } => self.run_isolated(fitness, None, &mut rng),
            Model::Mutation {
                forward_rate,
                backward_rate,
            } => self.run_isolated(&neutral, Some((*forward_rate, *backward_rate)), &mut rng),
            Model::Flow {
                demes,
                migration_rate,
            } => self.run_connected(&vec![neutral; *demes], *migration_rate, &mut rng),
            Model::SelectionFlow {
                migration_rate,
                fitness,
            } => self.run_connected(fitness, *migration_rate, &mut rng),
        }
    }

    fn observe_all<R: RngCore>(
        &self,
        demes: &[Deme],
        rng: &mut R,
    ) -> Result<Vec<f64>, SamplingError> {
        demes
            .iter()
            .map(|d| d.observe(self.sample_size, rng))
            .collect()
    }

    /// Replicate populations evolving without contact.
    fn run_isolated<R: RngCore>(
        &self,
        fitness: &Fitness,
        mutation: Option<(f64, f64)>,
        rng: &mut R,
    ) -> Result<SimulationRun, SimulationError> {
        let n = self.population_size;
        let labels = (0..self.replicates)
            .map(|i| format!("replicate_{i}"))
            .collect();
        let mut trajectories = Trajectories::new(labels, self.generations);
        let mut demes = vec![Deme::from_frequency(n, self.initial_frequency); self.replicates];

        trajectories.record(&self.observe_all(&demes, rng)?);

        for generation in 1..=self.generations {
            for deme in demes.iter_mut() {
                let p = match mutation {
                    Some((forward, backward)) => mutate(deme, forward, backward, rng)?,
                    None => deme.frequency(),
                };
                *deme = reproduce(p, n, fitness, rng)?;
            }

            let observed = self.observe_all(&demes, rng)?;
            debug!(generation, frequencies = ?observed, "generation complete");
            trajectories.record(&observed);
        }

        Ok(SimulationRun {
            trajectories,
            migrations: None,
        })
    }

    /// Island-model demes exchanging parents every generation.
    fn run_connected<R: RngCore>(
        &self,
        fitness: &[Fitness],
        migration_rate: f64,
        rng: &mut R,
    ) -> Result<SimulationRun, SimulationError> {
        if self.replicates > 1 {
            warn!(
                replicates = self.replicates,
                "gene flow models track demes, ignoring replicates"
            );
        }

        let n = self.population_size;
        let k = fitness.len();
        let migration = MigrationMatrix::island(k, migration_rate)?;
        debug!(%migration, "migration matrix");

        let labels = (0..migration.demes()).map(|i| format!("deme_{i}")).collect();
        let mut trajectories = Trajectories::new(labels, self.generations);
        let mut demes = vec![Deme::from_frequency(n, self.initial_frequency); k];
        let mut migrations: Array2<usize> = Array2::zeros((k, k));

        trajectories.record(&self.observe_all(&demes, rng)?);

        for generation in 1..=self.generations {
            let frequencies: Vec<f64> = demes.iter().map(Deme::frequency).collect();

            for (i, deme) in demes.iter_mut().enumerate() {
                let parents = migration.parent_counts(i, n, rng)?;
                let mut pooled = 0.0;
                for (j, &count) in parents.iter().enumerate() {
                    pooled += count as f64 * frequencies[j];
                    if j != i {
                        migrations[[j, i]] += count;
                    }
                }
                *deme = reproduce(pooled / n as f64, n, &fitness[i], rng)?;
            }

            let observed = self.observe_all(&demes, rng)?;
            debug!(generation, frequencies = ?observed, "generation complete");
            trajectories.record(&observed);
        }

        Ok(SimulationRun {
            trajectories,
            migrations: Some(migrations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(model: Model) -> Parameters {
        Parameters {
            population_size: 50,
            generations: 30,
            initial_frequency: 0.5,
            replicates: 4,
            sample_size: None,
            seed: 42,
            model,
        }
    }

    fn all_frequencies(run: &SimulationRun) -> impl Iterator<Item = f64> + '_ {
        run.trajectories.frequencies.iter().flatten().copied()
    }

    #[test]
    fn drift_is_reproducible_and_bounded() {
        let p = params(Model::Drift);
        let first = p.run().unwrap();
        let second = p.run().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.trajectories.frequencies.len(), 4);
        assert!(
            first
                .trajectories
                .frequencies
                .iter()
                .all(|series| series.len() == 31)
        );
        assert!(all_frequencies(&first).all(|f| (0.0..=1.0).contains(&f)));
        assert!(first.migrations.is_none());
    }

    #[test]
    fn fixed_alleles_stay_fixed_without_mutation() {
        for start in [0.0, 1.0] {
            let mut p = params(Model::Drift);
            p.initial_frequency = start;
            let run = p.run().unwrap();
            assert!(all_frequencies(&run).all(|f| f == start));
        }
    }

    #[test]
    fn strong_selection_fixes_favoured_allele() {
        let mut p = params(Model::Selection {
            fitness: Fitness([1.0, 0.6, 0.2]),
        });
        p.population_size = 500;
        p.generations = 200;
        let run = p.run().unwrap();

        assert!(run.trajectories.final_frequencies().iter().all(|&f| f > 0.95));
    }

    #[test]
    fn mutation_moves_fixed_population() {
        let mut p = params(Model::Mutation {
            forward_rate: 0.2,
            backward_rate: 0.0,
        });
        p.initial_frequency = 1.0;
        p.population_size = 200;
        let run = p.run().unwrap();

        assert!(run.trajectories.final_frequencies().iter().all(|&f| f < 0.2));
    }

    #[test]
    fn flow_records_every_parent_from_other_demes() {
        let mut p = params(Model::Flow {
            demes: 3,
            migration_rate: 1.0,
        });
        p.replicates = 1;
        let run = p.run().unwrap();
        let migrations = run.migrations.unwrap();

        assert_eq!(migrations.dim(), (3, 3));
        for i in 0..3 {
            assert_eq!(migrations[[i, i]], 0);
            assert_eq!(migrations.column(i).sum(), 50 * 30);
        }
        assert_eq!(run.trajectories.labels, vec!["deme_0", "deme_1", "deme_2"]);
    }

    #[test]
    fn closed_demes_do_not_exchange_parents() {
        let p = params(Model::Flow {
            demes: 2,
            migration_rate: 0.0,
        });
        let run = p.run().unwrap();
        assert_eq!(run.migrations.unwrap(), Array2::<usize>::zeros((2, 2)));
    }

    #[test]
    fn selection_flow_uses_one_fitness_per_deme() {
        let mut p = params(Model::SelectionFlow {
            migration_rate: 0.01,
            fitness: vec![Fitness([1.0, 1.0, 0.1]), Fitness([0.1, 1.0, 1.0])],
        });
        p.population_size = 300;
        p.generations = 100;
        let run = p.run().unwrap();
        let finals = run.trajectories.final_frequencies();

        assert_eq!(finals.len(), 2);
        assert!(finals[0] > finals[1]);
    }

    #[test]
    fn sampled_observations_use_whole_individuals() {
        let mut p = params(Model::Drift);
        p.sample_size = Some(10);
        let run = p.run().unwrap();

        // 10 diploids carry 20 copies, so every observation is a multiple of 1/20
        assert!(all_frequencies(&run).all(|f| ((f * 20.0).round() - f * 20.0).abs() < 1e-9));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut p = params(Model::Drift);
        p.population_size = 0;
        assert!(p.run().is_err());

        let mut p = params(Model::Drift);
        p.sample_size = Some(51);
        assert!(p.run().is_err());

        let p = params(Model::Flow {
            demes: 1,
            migration_rate: 0.1,
        });
        assert!(matches!(p.run(), Err(SimulationError::InvalidParameter(_))));

        let p = params(Model::Selection {
            fitness: Fitness([0.0, 0.0, 0.0]),
        });
        assert!(p.validate().is_err());
    }

    #[test]
    fn fitness_must_support_the_starting_population() {
        let mut p = params(Model::Selection {
            fitness: Fitness([0.0, 1.0, 1.0]),
        });
        p.initial_frequency = 1.0;
        assert!(matches!(
            p.validate(),
            Err(SimulationError::InvalidParameter(_))
        ));

        let mut p = params(Model::Selection {
            fitness: Fitness([1.0, 1.0, 0.0]),
        });
        p.initial_frequency = 0.0;
        assert!(p.validate().is_err());

        let mut p = params(Model::SelectionFlow {
            migration_rate: 0.1,
            fitness: vec![Fitness::neutral(), Fitness([1.0, 1.0, 0.0])],
        });
        p.initial_frequency = 0.0;
        assert!(p.validate().is_err());

        p.initial_frequency = 0.5;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn deme_bookkeeping() {
        let d = Deme::from_frequency(5, 0.3);
        assert_eq!(d.genotypes(), [1, 1, 3]);
        assert_eq!(d.size(), 5);
        assert_eq!(d.allele_count(), 3);
        assert!((d.frequency() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn fitness_parses_from_cli_text() {
        assert_eq!(
            "1, 0.9,0.8".parse::<Fitness>().unwrap(),
            Fitness([1.0, 0.9, 0.8])
        );
        assert!("1,2".parse::<Fitness>().is_err());
        assert!("1,x,2".parse::<Fitness>().is_err());
    }

    #[test]
    fn parameters_load_from_json() {
        let json = r#"{
            "population_size": 20,
            "generations": 5,
            "initial_frequency": 0.25,
            "seed": 7,
            "model": { "type": "selection-flow", "migration_rate": 0.1,
                       "fitness": [[1.0, 0.9, 0.8], [0.8, 0.9, 1.0]] }
        }"#;
        let p: Parameters = serde_json::from_str(json).unwrap();

        assert_eq!(p.replicates, 1);
        assert_eq!(p.sample_size, None);
        assert_eq!(p.model.to_string(), "selection-flow");
        assert!(p.run().is_ok());
    }

    #[test]
    fn genotype_lottery_weights_by_fitness() {
        let probs = genotype_probabilities(0.5, &Fitness([2.0, 1.0, 0.0])).unwrap();
        assert!((probs[0] - 0.5).abs() < 1e-12);
        assert!((probs[1] - 0.5).abs() < 1e-12);
        assert_eq!(probs[2], 0.0);

        assert!(genotype_probabilities(1.0, &Fitness([0.0, 1.0, 1.0])).is_err());
    }
}
