//! Module graph: modules in an arena, indexed by id, with their outgoing
//! relationships cached as shared slices for the evaluator's hot path.
//!
//! Deleted modules leave a tombstone so arena positions stay stable.
//! Relationships in other modules that target a deleted module are kept;
//! the evaluator treats them as dangling.

use crate::catalog::clean_name;
use crate::{RegistryError, RegistryResult};
use modflow_model::{Module, Relationship, SourceRef, TargetBinding, TargetRef};
use modflow_types::{EventType, ModuleId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Slot {
    module: Module,
    outgoing: Arc<[Relationship]>,
}

#[derive(Debug)]
pub(crate) struct ModuleGraph {
    arena: Vec<Option<Slot>>,
    index: HashMap<ModuleId, usize>,
    relationship_count: usize,
    empty: Arc<[Relationship]>,
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self {
            arena: Vec::new(),
            index: HashMap::new(),
            relationship_count: 0,
            empty: Arc::from(Vec::new()),
        }
    }
}

impl ModuleGraph {
    pub(crate) fn create(&mut self, id: Option<ModuleId>, name: &str) -> RegistryResult<Module> {
        let name = clean_name("module", name)?;
        let mut module = Module::new(name);
        if let Some(id) = id {
            module.id = id;
        }
        self.insert(module.clone())?;
        Ok(module)
    }

    /// Inserts a module as-is. Relationship targets are not checked.
    pub(crate) fn insert(&mut self, module: Module) -> RegistryResult<()> {
        if self.index.contains_key(&module.id) {
            return Err(RegistryError::Validation(format!("duplicate module id {}", module.id)));
        }
        if let Some(rel) = module.relationships.iter().find(|r| r.base_module != module.id) {
            return Err(RegistryError::Validation(format!(
                "relationship of module {} has base module {}",
                module.id, rel.base_module
            )));
        }
        self.relationship_count += module.relationships.len();
        self.index.insert(module.id.clone(), self.arena.len());
        let outgoing = Arc::from(module.relationships.clone());
        self.arena.push(Some(Slot { module, outgoing }));
        Ok(())
    }

    pub(crate) fn contains(&self, id: &ModuleId) -> bool {
        self.index.contains_key(id)
    }

    pub(crate) fn get(&self, id: &ModuleId) -> RegistryResult<&Module> {
        self.slot(id).map(|s| &s.module)
    }

    pub(crate) fn list(&self) -> Vec<Module> {
        self.arena.iter().flatten().map(|s| s.module.clone()).collect()
    }

    pub(crate) fn rename(&mut self, id: &ModuleId, name: &str) -> RegistryResult<Module> {
        let name = clean_name("module", name)?;
        let slot = self.slot_mut(id)?;
        slot.module.name = name;
        slot.module.updated_at = modflow_model::now_millis();
        Ok(slot.module.clone())
    }

    /// Replaces the full relationship list of a module. All-or-nothing.
    pub(crate) fn set_relationships(
        &mut self,
        id: &ModuleId,
        relationships: Vec<Relationship>,
    ) -> RegistryResult<Module> {
        if !self.contains(id) {
            return Err(RegistryError::Validation(format!("module {id} does not exist")));
        }
        for (index, rel) in relationships.iter().enumerate() {
            if &rel.base_module != id {
                return Err(RegistryError::Validation(format!(
                    "relationship {index} has base module {} but belongs to {id}",
                    rel.base_module
                )));
            }
            if !self.contains(&rel.target_module) {
                return Err(RegistryError::Validation(format!(
                    "relationship {index} targets unknown module {}",
                    rel.target_module
                )));
            }
            check_rules(index, rel)?;
        }

        let added = relationships.len();
        let slot = self.slot_mut(id)?;
        let removed = slot.module.relationships.len();
        slot.outgoing = Arc::from(relationships.clone());
        slot.module.relationships = relationships;
        slot.module.updated_at = modflow_model::now_millis();
        let module = slot.module.clone();
        self.relationship_count = self.relationship_count - removed + added;
        Ok(module)
    }

    pub(crate) fn remove(&mut self, id: &ModuleId) -> RegistryResult<Module> {
        let position = self
            .index
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(format!("module {id}")))?;
        let slot = self.arena[position]
            .take()
            .ok_or_else(|| RegistryError::NotFound(format!("module {id}")))?;
        self.relationship_count -= slot.module.relationships.len();
        Ok(slot.module)
    }

    /// Outgoing relationships of a module. Unknown modules have none.
    pub(crate) fn relationships_from(&self, id: &ModuleId) -> Arc<[Relationship]> {
        self.slot(id)
            .map(|s| Arc::clone(&s.outgoing))
            .unwrap_or_else(|_| Arc::clone(&self.empty))
    }

    /// Modules with at least one relationship targeting `id`.
    pub(crate) fn referencing(&self, id: &ModuleId) -> Vec<ModuleId> {
        self.arena
            .iter()
            .flatten()
            .filter(|s| s.outgoing.iter().any(|r| &r.target_module == id))
            .map(|s| s.module.id.clone())
            .collect()
    }

    pub(crate) fn relationship_count(&self) -> usize {
        self.relationship_count
    }

    fn slot(&self, id: &ModuleId) -> RegistryResult<&Slot> {
        self.index
            .get(id)
            .and_then(|&i| self.arena[i].as_ref())
            .ok_or_else(|| RegistryError::NotFound(format!("module {id}")))
    }

    fn slot_mut(&mut self, id: &ModuleId) -> RegistryResult<&mut Slot> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(format!("module {id}")))?;
        self.arena[position]
            .as_mut()
            .ok_or_else(|| RegistryError::NotFound(format!("module {id}")))
    }
}

/// Checks the field addresses of every rule of an authored relationship.
///
/// Snapshot loading does not come through here, so stored documents with
/// bad addresses still load and fail rule by rule at evaluation time.
fn check_rules(index: usize, rel: &Relationship) -> RegistryResult<()> {
    check_binding(&rel.binding, &rel.target_module)
        .map_err(|why| RegistryError::Validation(format!("relationship {index} binding: {why}")))?;

    for event in EventType::ALL {
        for (rule_index, rule) in rel.event_rules.rules_for(event).iter().enumerate() {
            let invalid = |why: String| {
                let at = format!("relationship {index} {event} rule {rule_index}");
                RegistryError::Validation(format!("{at}: {why}"))
            };
            match rule.target_field.as_deref() {
                Some(raw) => check_target(raw, &rel.target_module).map_err(invalid)?,
                None if rule.action.needs_target_field() => {
                    return Err(invalid(format!("{} needs a targetField", rule.action)));
                }
                None => {}
            }
            if let Some(raw) = &rule.source_field {
                SourceRef::parse(raw).map_err(|e| invalid(e.to_string()))?;
            }
            if let Some(binding) = &rule.binding {
                check_binding(binding, &rel.target_module)
                    .map_err(|why| invalid(format!("binding: {why}")))?;
            }
        }
    }
    Ok(())
}

fn check_target(raw: &str, target_module: &ModuleId) -> Result<(), String> {
    let target = TargetRef::parse(raw).map_err(|e| e.to_string())?;
    if target.module_id() != target_module {
        return Err(format!("{raw} is outside target module {target_module}"));
    }
    Ok(())
}

fn check_binding(binding: &TargetBinding, target_module: &ModuleId) -> Result<(), String> {
    match binding {
        TargetBinding::ForeignKey { source_field } => {
            SourceRef::parse(source_field).map_err(|e| e.to_string())?;
        }
        TargetBinding::Match { source_field, target_field } => {
            SourceRef::parse(source_field).map_err(|e| e.to_string())?;
            if target_field.starts_with('$') {
                check_target(target_field, target_module)?;
            } else if target_field.trim().is_empty() {
                return Err("match binding has an empty targetField".to_string());
            }
        }
        TargetBinding::Sole | TargetBinding::Record { .. } | TargetBinding::Source => {}
    }
    Ok(())
}
