//! The chunk: owned grains, particle sources, and the tick counter.

use biosphere_types::{ChunkWall, Grain, GrainId, GrainKind, Vec3f};
use rand::Rng;

use crate::physics::Integrator;

/// Spawn position of the soil source in a fresh chunk.
pub const SOIL_SOURCE: Vec3f = Vec3f::new(0.5, 0.5, 2.0);
/// Spawn position of the water source in a fresh chunk.
pub const WATER_SOURCE: Vec3f = Vec3f::new(0.5, 0.55, 2.1);
/// Spawn position of the cell source in a fresh chunk.
pub const CELL_SOURCE: Vec3f = Vec3f::new(0.55, 0.5, 2.2);

/// Horizontal jitter applied to emitted grains so they do not stack.
const EMIT_JITTER: f32 = 0.01;

/// Emits grains of one kind at a fixed position, one per tick, until exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSource {
    /// Kind of grain emitted.
    pub kind: GrainKind,
    /// Emission point in the chunk frame.
    pub position: Vec3f,
    /// Grains left to emit.
    pub remaining: u32,
}

impl ParticleSource {
    /// A source emitting `count` grains of `kind` at `position`.
    pub const fn new(kind: GrainKind, position: Vec3f, count: u32) -> Self {
        Self {
            kind,
            position,
            remaining: count,
        }
    }

    /// Whether the source has nothing left to emit.
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Emit the next grain, if any remain.
    fn emit<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Grain> {
        self.remaining = self.remaining.checked_sub(1)?;
        let jitter = Vec3f::new(
            rng.random_range(-EMIT_JITTER..EMIT_JITTER),
            rng.random_range(-EMIT_JITTER..EMIT_JITTER),
            0.0,
        );
        let cell_prop = match self.kind {
            GrainKind::Cell => Some(serde_json::json!({ "generation": 0 })),
            GrainKind::Soil | GrainKind::Water => None,
        };
        Some(Grain {
            id: GrainId(rng.random()),
            position: self.position + jitter,
            velocity: Vec3f::default(),
            kind: self.kind,
            cell_prop,
        })
    }
}

/// One chunk's simulation state.
///
/// Owned exclusively by its worker (streaming model) or rebuilt per call
/// (step model).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrainChunk {
    grains: Vec<Grain>,
    sources: Vec<ParticleSource>,
    tick: u64,
}

impl GrainChunk {
    /// A chunk holding `grains` at `tick`, with no sources.
    pub const fn with_grains(grains: Vec<Grain>, tick: u64) -> Self {
        Self {
            grains,
            sources: Vec::new(),
            tick,
        }
    }

    /// A fresh chunk at tick 0 seeded with the standard sources.
    ///
    /// A source is only installed when its count is non-zero.
    pub fn seeded(num_soil: u32, num_water: u32, num_cells: u32) -> Self {
        let sources = [
            ParticleSource::new(GrainKind::Soil, SOIL_SOURCE, num_soil),
            ParticleSource::new(GrainKind::Water, WATER_SOURCE, num_water),
            ParticleSource::new(GrainKind::Cell, CELL_SOURCE, num_cells),
        ]
        .into_iter()
        .filter(|s| !s.is_exhausted())
        .collect();

        Self {
            grains: Vec::new(),
            sources,
            tick: 0,
        }
    }

    /// Current tick.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Grains currently owned by the chunk.
    pub fn grains(&self) -> &[Grain] {
        &self.grains
    }

    /// Installed sources, including exhausted ones.
    pub fn sources(&self) -> &[ParticleSource] {
        &self.sources
    }

    /// Take ownership of grains handed over by neighbors.
    pub fn incorporate(&mut self, grains: Vec<Grain>) {
        self.grains.extend(grains);
    }

    /// Advance one tick and return the grains that left the unit cell.
    ///
    /// Each live source emits one grain, the integrator runs, the tick
    /// counter advances, and every grain outside `[0, 1)^2` is removed from
    /// the chunk and returned.
    pub fn step(
        &mut self,
        integrator: &dyn Integrator,
        environment: &[Grain],
        wall: ChunkWall,
    ) -> Vec<Grain> {
        let mut rng = rand::rng();
        for source in &mut self.sources {
            if let Some(grain) = source.emit(&mut rng) {
                self.grains.push(grain);
            }
        }

        integrator.integrate(&mut self.grains, environment, wall);
        self.tick = self.tick.saturating_add(1);

        let (inside, escaped): (Vec<Grain>, Vec<Grain>) = std::mem::take(&mut self.grains)
            .into_iter()
            .partition(Grain::is_inside_unit_cell);
        self.grains = inside;
        escaped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::physics::BallisticIntegrator;

    /// Pushes every grain one full chunk toward +x.
    struct ShiftEast;

    impl Integrator for ShiftEast {
        fn integrate(&self, grains: &mut [Grain], _environment: &[Grain], _wall: ChunkWall) {
            for grain in grains {
                grain.position.x += 1.0;
            }
        }
    }

    fn grain(id: u64, x: f32) -> Grain {
        Grain {
            id: GrainId(id),
            position: Vec3f::new(x, 0.5, 0.0),
            velocity: Vec3f::default(),
            kind: GrainKind::Water,
            cell_prop: None,
        }
    }

    #[test]
    fn seeded_chunk_skips_empty_sources() {
        let chunk = GrainChunk::seeded(0, 3, 10);
        assert_eq!(chunk.sources().len(), 2);
        assert_eq!(chunk.tick(), 0);
        assert!(chunk.grains().is_empty());
    }

    #[test]
    fn sources_emit_once_per_tick_until_exhausted() {
        let integrator = BallisticIntegrator::default();
        let mut chunk = GrainChunk::seeded(2, 0, 1);

        for _ in 0..5 {
            let escaped = chunk.step(&integrator, &[], ChunkWall::CLOSED);
            assert!(escaped.is_empty());
        }

        assert_eq!(chunk.tick(), 5);
        assert_eq!(chunk.grains().len(), 3);
        assert!(chunk.sources().iter().all(ParticleSource::is_exhausted));

        let cells: Vec<_> = chunk
            .grains()
            .iter()
            .filter(|g| g.kind == GrainKind::Cell)
            .collect();
        assert_eq!(cells.len(), 1);
        assert!(cells[0].cell_prop.is_some());
    }

    #[test]
    fn escaped_grains_leave_the_chunk() {
        let mut chunk = GrainChunk::with_grains(vec![grain(1, 0.2), grain(2, 0.6)], 41);
        chunk.incorporate(vec![grain(3, 0.4)]);

        let escaped = chunk.step(&ShiftEast, &[], ChunkWall::CLOSED);

        assert_eq!(chunk.tick(), 42);
        assert!(chunk.grains().is_empty());
        assert_eq!(escaped.len(), 3);
        assert!(escaped.iter().all(|g| g.position.x >= 1.0));
    }
}
