use crate::{Emission, InfiniteLight, Material};
use wavecore_geom::Ray;
use std::sync::Arc;

/// Result of a shadow-ray query: either unoccluded-to-distance, or a hit
/// recorded for shading (spec.md §6's `Scene::trace_shadow`).
#[derive(Debug, Clone, Copy)]
pub enum ShadowHit {
    Clear,
    Occluded { entity_id: u32, distance: f32 },
}

/// Opaque entity handle surfaced to the stream pipeline/shading groups.
/// `material_id`/`emission_id` index into `Scene::materials`/`emissions`;
/// `u32::MAX` (`wavecore_geom::INVALID_ID`) means "none".
#[derive(Debug, Clone, Copy)]
pub struct EntityHandle {
    pub entity_id: u32,
    pub material_id: u32,
    pub emission_id: u32,
}

/// Everything the stream pipeline and shading-group dispatch require of the
/// scene-graph / acceleration-structure collaborator (spec.md §6). The
/// acceleration structure, BVH traversal and entity database themselves
/// are out of scope; only this trait boundary is specified here.
pub trait Scene: Send + Sync {
    /// Fills `hit_stream` from `ray_stream`'s current read span. A miss is
    /// recorded by the caller as `entity_id = INVALID_ID`
    /// (`wavecore_geom::INVALID_ID`) when this returns no hit for a ray.
    fn trace_rays(&self, rays: &[Ray], hits: &mut dyn FnMut(usize, Option<EntityHandle>, f32));

    fn trace_occlusion(&self, ray: &Ray) -> bool;
    fn trace_shadow(&self, ray: &Ray) -> ShadowHit;

    fn entities(&self) -> &[EntityHandle];
    fn materials(&self) -> &[Arc<dyn Material>];
    fn emissions(&self) -> &[Arc<dyn Emission>];
    fn infinite_lights(&self) -> &[Arc<dyn InfiniteLight>];
    /// Entities directly usable as area lights (a subset of `entities()`).
    fn lights(&self) -> &[EntityHandle];
}
