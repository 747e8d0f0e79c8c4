//! Wavefront streaming render core for a spectral Monte-Carlo path tracer:
//! a bounded ray/hit stream pipeline, an adaptive tile scheduler, and a
//! filtered spectral framebuffer/AOV output system, glued together behind
//! [`RenderContext`]. Scene traversal, materials, emission and integrator
//! policy are external collaborators, represented here only as the
//! [`wavecore_api`] trait contracts plus the [`session::Integrator`] seam
//! this crate needs to drive a render end to end.

mod context;
pub mod error;
pub mod logging;
mod session;

pub use context::{RenderConfig, RenderContext, RenderStatus, StatusField};
pub use session::Integrator;

pub use wavecore_api as api;
pub use wavecore_geom as geom;
pub use wavecore_output as output;
pub use wavecore_spectral as spectral;
pub use wavecore_stream as stream;
pub use wavecore_tile as tile;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::{IVec2, UVec2, Vec3};
    use wavecore_api::{
        Camera, CameraRay, CameraSample, Emission, EntityHandle, InfiniteLight, Material, Scene,
        ShadowHit,
    };
    use wavecore_api::{MaterialEvalContext, MaterialEvalOutput, MaterialSampleContext, MaterialSampleOutput};
    use wavecore_geom::{rng::Rng, Rect2i, Ray, SpectralBlob};
    use wavecore_output::{
        ChannelKind, EnabledChannels, FilterCache, FilterKind, GlobalOutputDevice,
        LocalOutputDevice, LocalOutputQueue, LpeExpr, SpectralEntry,
    };
    use wavecore_spectral::{RgbPrimaries, TristimulusMapper};
    use wavecore_stream::{RoundOutput, StreamPipeline};
    use wavecore_tile::{SchedulerConfig, TileMode, TileScheduler};

    /// A pinhole camera over a unit square sensor, just enough to drive
    /// the pipeline end to end in tests. S1/S4/S5/S6 span output+tile+
    /// spectral together, so they live here rather than in any one leaf
    /// crate.
    struct TestCamera;
    impl Camera for TestCamera {
        fn construct_ray(&self, sample: &CameraSample) -> Option<CameraRay> {
            let uv = sample.pixel / sample.sensor_size.as_vec2();
            Some(CameraRay {
                origin: Vec3::new(uv.x, uv.y, 0.0),
                direction: Vec3::Z,
                min_t: 1e-4,
                max_t: f32::INFINITY,
                is_monochrome: false,
                blend_weight: 1.0,
                importance: SpectralBlob::splat(1.0),
                wavelength_nm: SpectralBlob::splat(550.0),
                wavelength_pdf: SpectralBlob::splat(1.0),
                time: sample.time,
            })
        }
    }

    struct WhiteMaterial;
    impl Material for WhiteMaterial {
        fn eval(&self, _ctx: &MaterialEvalContext) -> MaterialEvalOutput {
            MaterialEvalOutput {
                weight: SpectralBlob::splat(0.5),
                pdf_s: 1.0,
            }
        }
        fn sample(&self, ctx: &MaterialSampleContext, _rng: &mut Rng) -> MaterialSampleOutput {
            MaterialSampleOutput {
                weight: SpectralBlob::splat(0.5),
                pdf_s: 1.0,
                direction: ctx.view,
                is_specular: false,
            }
        }
        fn pdf(&self, _ctx: &MaterialEvalContext) -> f32 {
            1.0
        }
    }

    /// A scene that hits everything with entity 0 and one flat-white
    /// material, no lights — enough surface area to exercise shading
    /// groups without a real acceleration structure.
    struct FlatScene {
        material: Arc<dyn Material>,
        entities: Vec<EntityHandle>,
    }

    impl Scene for FlatScene {
        fn trace_rays(&self, rays: &[Ray], hits: &mut dyn FnMut(usize, Option<EntityHandle>, f32)) {
            for i in 0..rays.len() {
                hits(i, Some(self.entities[0]), 1.0);
            }
        }
        fn trace_occlusion(&self, _ray: &Ray) -> bool {
            false
        }
        fn trace_shadow(&self, _ray: &Ray) -> ShadowHit {
            ShadowHit::Clear
        }
        fn entities(&self) -> &[EntityHandle] {
            &self.entities
        }
        fn materials(&self) -> &[Arc<dyn Material>] {
            std::slice::from_ref(&self.material)
        }
        fn emissions(&self) -> &[Arc<dyn Emission>] {
            &[]
        }
        fn infinite_lights(&self) -> &[Arc<dyn InfiniteLight>] {
            &[]
        }
        fn lights(&self) -> &[EntityHandle] {
            &[]
        }
    }

    /// An integrator that terminates every path at its first hit,
    /// contributing the material's flat albedo directly as radiance. Just
    /// enough "integrator policy" to drive the pipeline end to end in a
    /// test; a real downstream integrator would be far more elaborate.
    struct OneBounceIntegrator;
    impl Integrator for OneBounceIntegrator {
        fn integrate(
            &self,
            round: &RoundOutput,
            _pipeline: &mut StreamPipeline,
            _scene: &dyn Scene,
            queue: &mut LocalOutputQueue,
            local: &mut LocalOutputDevice,
            _rng: &mut Rng,
        ) {
            for group in &round.groups {
                if group.is_background() {
                    continue;
                }
                for &idx in &group.indices {
                    let entry = round.hits.entry(idx as usize);
                    let pixel = glam::IVec2::new(entry.ray_index as i32 % 4, entry.ray_index as i32 / 4);
                    queue.push_spectral(
                        SpectralEntry {
                            position: pixel,
                            weight: SpectralBlob::splat(0.5),
                            wavelengths: SpectralBlob::splat(550.0),
                            mono: false,
                            blend_weight: 1.0,
                            path: vec!['C', 'D', 'E'],
                        },
                        local,
                    );
                }
            }
        }
    }

    fn flat_scene_context(
        view: UVec2,
        config: RenderConfig,
    ) -> RenderContext {
        let entities = vec![EntityHandle {
            entity_id: 0,
            material_id: 0,
            emission_id: wavecore_geom::INVALID_ID,
        }];
        let scene: Arc<dyn Scene> = Arc::new(FlatScene {
            material: Arc::new(WhiteMaterial),
            entities,
        });
        let camera: Arc<dyn Camera> = Arc::new(TestCamera);
        let integrator: Arc<dyn Integrator> = Arc::new(OneBounceIntegrator);
        RenderContext::new(scene, camera, integrator, view, config)
    }

    #[test]
    fn pipeline_tile_and_output_crates_compose_end_to_end() {
        let mut ctx = flat_scene_context(
            UVec2::new(4, 4),
            RenderConfig {
                max_iterations: 1,
                samples_per_round: 1,
                filter_radius: 0,
                ..RenderConfig::default()
            },
        );
        ctx.start(1, 1, 1).expect("start should succeed");
        ctx.join();

        ctx.output().with_frame(|frame| {
            let total: f32 = frame.output.iter().map(|c| c.r + c.g + c.b).sum();
            assert!(total > 0.0, "expected radiance from the one-bounce integrator");
        });
    }

    #[test]
    fn unknown_channel_tag_is_ignored_not_fatal() {
        let mut ctx = flat_scene_context(UVec2::new(2, 2), RenderConfig::default());
        ctx.enable_channel("not_a_real_channel");
        ctx.enable_channel("position");
    }

    #[test]
    fn register_custom_and_lpe_channel_ids_are_distinct() {
        let mut ctx = flat_scene_context(UVec2::new(2, 2), RenderConfig::default());
        let a = ctx.register_custom_channel(ChannelKind::OneD);
        let b = ctx
            .register_lpe_channel(ChannelKind::Spectral, "C.*E")
            .expect("valid LPE expression");
        assert_ne!(a, b);
    }

    /// Single pixel, no filter, one camera ray hitting a flat white
    /// emitter: `Output` must land within 2% of the direct CIE-E mapping
    /// of the same spectrum.
    #[test]
    fn scenario_s1_single_pixel_no_filter_matches_cie_e_mapping() {
        let mapper = Arc::new(TristimulusMapper::new(RgbPrimaries::Srgb));
        let filter = Arc::new(FilterCache::new(FilterKind::Block, 0));
        let tile = Rect2i::new(IVec2::ZERO, IVec2::new(1, 1));
        let mut local = LocalOutputDevice::new(tile, filter, mapper.clone(), EnabledChannels::empty());

        let wavelengths = SpectralBlob([550.0, 600.0, 650.0, 500.0]);
        let weight = SpectralBlob::splat(1.0);
        local.push_spectral(&SpectralEntry {
            position: IVec2::new(0, 0),
            weight,
            wavelengths,
            mono: false,
            blend_weight: 1.0,
            path: vec!['C', 'D', 'E'],
        });

        let expected = mapper.spectral_to_rgb(weight, wavelengths, false);
        let idx = local.frame.index(0, 0).expect("pixel in range");
        let got = local.frame.output[idx];
        let scale = expected.r.abs().max(expected.g.abs()).max(expected.b.abs()).max(1e-6);
        let tol = 0.02 * scale;
        assert!(wavecore_geom::approx_eq(got.r, expected.r, tol));
        assert!(wavecore_geom::approx_eq(got.g, expected.g, tol));
        assert!(wavecore_geom::approx_eq(got.b, expected.b, tol));
    }

    /// Running mean over two iterations: merging a local frame of 2 then
    /// a local frame of 4 must read back 3 everywhere, not 6 (spec.md
    /// §4.3.3's iteration-counted average, not a running sum).
    #[test]
    fn scenario_s4_merge_is_a_running_mean_over_iterations() {
        let mapper = Arc::new(TristimulusMapper::new(RgbPrimaries::Srgb));
        let filter = Arc::new(FilterCache::new(FilterKind::Block, 0));
        let tile = Rect2i::new(IVec2::ZERO, IVec2::new(2, 2));
        let global = GlobalOutputDevice::new(2, 2, EnabledChannels::empty());
        let mut local = LocalOutputDevice::new(tile, filter, mapper, EnabledChannels::empty());

        local.frame.output.fill(wavecore_spectral::Rgb { r: 2.0, g: 2.0, b: 2.0 });
        global.merge(&mut local);

        local.frame.output.fill(wavecore_spectral::Rgb { r: 4.0, g: 4.0, b: 4.0 });
        global.merge(&mut local);

        global.with_frame(|frame| {
            for c in &frame.output {
                assert!(wavecore_geom::approx_eq(c.r, 3.0, 1e-4));
                assert!(wavecore_geom::approx_eq(c.g, 3.0, 1e-4));
                assert!(wavecore_geom::approx_eq(c.b, 3.0, 1e-4));
            }
        });
    }

    /// Adaptive split: a tile that took far longer than its neighbours'
    /// average gets halved once no idle tile remains to hand out.
    #[test]
    fn scenario_s5_adaptive_split_halves_the_slow_tile() {
        let scheduler = TileScheduler::new(
            UVec2::new(256, 128),
            4,
            1,
            TileMode::Linear,
            1,
            SchedulerConfig {
                adaptive: true,
                min_time_spent_us: 1_000,
            },
        );

        let fast_a = scheduler.next_tile().expect("tile available");
        fast_a.release(1, 50);
        let fast_b = scheduler.next_tile().expect("tile available");
        fast_b.release(1, 50);
        let slow = scheduler.next_tile().expect("tile available");
        let slow_size = slow.rect.view_size();
        slow.release(1, 10_000_000);
        // Fourth tile stays acquired (simulating a worker still busy on
        // it), so the next request finds no idle tile and must split.
        let _busy = scheduler.next_tile().expect("tile available");

        let before = scheduler.tile_count();
        let split_half = scheduler.next_tile().expect("split should free a tile");
        assert_eq!(scheduler.tile_count(), before + 1);
        assert_eq!(split_half.rect.view_size().x, slow_size.x);
        assert_eq!(split_half.rect.view_size().y, slow_size.y / 2);
    }

    /// LPE match: a channel gated on `CD.*E` accepts the path `C D R E`;
    /// one gated on `CS.*E` does not.
    #[test]
    fn scenario_s6_lpe_expression_gates_matching_paths_only() {
        let accepts = LpeExpr::compile("CD.*E").expect("valid LPE expression");
        let rejects = LpeExpr::compile("CS.*E").expect("valid LPE expression");
        let path = ['C', 'D', 'R', 'E'];
        assert!(accepts.matches(&path));
        assert!(!rejects.matches(&path));
    }
}
