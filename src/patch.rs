//! Per-entity visual overrides applied after instantiation.
//!
//! Names resolve through the asset's name map. A name that resolves to
//! nothing is skipped silently: hosts routinely pass lists written for a
//! family of models. A resolved node without its own renderable forwards the
//! override to every renderable below it.
//!
//! Results follow input order only.

use std::collections::{HashMap, HashSet};

use crate::{
    asset::LoadedAsset,
    backend::RenderBackend,
    data_structures::{color::Rgba, scene_graph::Entity},
};

/// An entity the host marked selectable, as reported to the selection callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectionEntry {
    pub id: u32,
    pub name: String,
}

/// Base color override for a named node.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorPatch {
    pub name: String,
    pub color: Rgba,
}

impl ColorPatch {
    pub fn new(name: impl Into<String>, color: impl Into<Rgba>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Color overrides in effect on the current asset.
///
/// Patched colors replace the declared ones for good. Highlighted entities
/// are the ones a selection tint was painted on; unselecting one puts its
/// patched color back, or the declared color when it was never patched.
#[derive(Debug, Default)]
pub struct Overrides {
    patched: HashMap<(Entity, usize), Rgba>,
    highlighted: Vec<(Entity, Rgba)>,
}

impl Overrides {
    /// Forget everything; the asset these overrides referred to is gone.
    pub fn clear(&mut self) {
        self.patched.clear();
        self.highlighted.clear();
    }

    pub fn highlighted(&self) -> impl Iterator<Item = Entity> + '_ {
        self.highlighted.iter().map(|&(entity, _)| entity)
    }

    pub fn patched_color(&self, entity: Entity, primitive: usize) -> Option<Rgba> {
        self.patched.get(&(entity, primitive)).copied()
    }

    /// Repaint every primitive under `entity` with its patched or declared color.
    fn restore<B: RenderBackend>(&self, backend: &mut B, asset: &LoadedAsset, entity: Entity) {
        for target in asset.graph().renderable_targets(entity) {
            let Some(renderable) = asset.graph().node(target).and_then(|n| n.renderable.as_ref())
            else {
                continue;
            };
            for (primitive, &declared) in renderable.declared_colors.iter().enumerate() {
                let color = self.patched_color(target, primitive).unwrap_or(declared);
                backend.set_base_color(target, primitive, color);
            }
        }
    }
}

/// Overwrite the base color of every primitive under `entity` and return the
/// primitives that were painted.
fn tint<B: RenderBackend>(
    backend: &mut B,
    asset: &LoadedAsset,
    entity: Entity,
    color: Rgba,
) -> Vec<(Entity, usize)> {
    let mut painted = Vec::new();
    for target in asset.graph().renderable_targets(entity) {
        let primitives = asset
            .graph()
            .node(target)
            .and_then(|node| node.renderable.as_ref())
            .map_or(0, |r| r.declared_colors.len());
        for primitive in 0..primitives {
            if backend.set_base_color(target, primitive, color) {
                painted.push((target, primitive));
            } else {
                log::warn!(
                    "{:?} lost primitive {} before it could be tinted",
                    target,
                    primitive
                );
            }
        }
    }
    painted
}

/// Resolve `names` in order and, when `selection_color` is given, tint each
/// resolved entity with it.
///
/// A name listed twice is reported once, at its first position.
pub fn apply_selection<B: RenderBackend>(
    backend: &mut B,
    asset: &LoadedAsset,
    overrides: &mut Overrides,
    names: &[String],
    selection_color: Option<Rgba>,
) -> Vec<SelectionEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for name in names {
        let Some(entity) = asset.entity_by_name(name) else {
            log::debug!("Selectable {:?} is not part of {}", name, asset.name());
            continue;
        };
        if !seen.insert(entity) {
            continue;
        }
        if let Some(color) = selection_color {
            tint(backend, asset, entity, color);
            overrides.highlighted.retain(|&(e, _)| e != entity);
            overrides.highlighted.push((entity, color));
        }
        entries.push(SelectionEntry {
            id: entity.id(),
            name: name.clone(),
        });
    }
    entries
}

/// Apply `patches` in order; a later patch on the same name wins.
/// Returns how many patches resolved.
pub fn apply_color_patches<B: RenderBackend>(
    backend: &mut B,
    asset: &LoadedAsset,
    overrides: &mut Overrides,
    patches: &[ColorPatch],
) -> usize {
    let mut applied = 0;
    for patch in patches {
        match asset.entity_by_name(&patch.name) {
            Some(entity) => {
                for painted in tint(backend, asset, entity, patch.color) {
                    overrides.patched.insert(painted, patch.color);
                }
                applied += 1;
            }
            None => log::debug!(
                "Color patch {:?} matches nothing in {}",
                patch.name,
                asset.name()
            ),
        }
    }
    applied
}

/// Take the selection tint off the given entity ids, or off every highlighted
/// entity when `ids` is `None`. Entities go back to their patched color when
/// they have one. Returns how many highlighted entities were restored; other
/// ids are ignored.
pub fn unselect<B: RenderBackend>(
    backend: &mut B,
    asset: &LoadedAsset,
    overrides: &mut Overrides,
    ids: Option<&[u32]>,
) -> usize {
    let entities: Vec<Entity> = match ids {
        Some(ids) => {
            let mut entities = Vec::new();
            for entity in ids.iter().map(|&id| Entity::from_raw(id)) {
                if let Some(index) = overrides.highlighted.iter().position(|&(e, _)| e == entity)
                {
                    entities.push(overrides.highlighted.remove(index).0);
                }
            }
            entities
        }
        None => std::mem::take(&mut overrides.highlighted)
            .into_iter()
            .map(|(entity, _)| entity)
            .collect(),
    };
    for &entity in &entities {
        overrides.restore(backend, asset, entity);
    }
    // a group and one of its members may both have been highlighted
    if !entities.is_empty() {
        for &(entity, color) in &overrides.highlighted {
            tint(backend, asset, entity, color);
        }
    }
    entities.len()
}
