//! Reference-counted asset cache
//!
//! One entry per ready descriptor. Each outstanding reference is one requester
//! or one dependent entry; the entry is evicted when the count reaches zero
//! and the caller is handed what it must dispose and release.

use crate::asset::Asset;
use crate::descriptor::AssetDescriptor;
use crate::loader::Loader;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct CacheEntry {
    pub asset: Asset,
    pub ref_count: usize,
    /// Dependencies this entry holds one reference on each.
    pub dependencies: Vec<AssetDescriptor>,
    /// The loader that finalized `asset`, and so the one that disposes it.
    pub loader: Arc<dyn Loader>,
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("asset", &self.asset)
            .field("ref_count", &self.ref_count)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Outcome of dropping one reference.
#[derive(Debug)]
pub enum Released {
    Retained(usize),
    Evicted(CacheEntry),
    Missing,
}

#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<AssetDescriptor, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, descriptor: &AssetDescriptor) -> Option<&Asset> {
        self.entries.get(descriptor).map(|e| &e.asset)
    }

    pub fn entry(&self, descriptor: &AssetDescriptor) -> Option<&CacheEntry> {
        self.entries.get(descriptor)
    }

    pub fn contains(&self, descriptor: &AssetDescriptor) -> bool {
        self.entries.contains_key(descriptor)
    }

    pub fn ref_count(&self, descriptor: &AssetDescriptor) -> Option<usize> {
        self.entries.get(descriptor).map(|e| e.ref_count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetDescriptor, &CacheEntry)> {
        self.entries.iter()
    }

    pub fn insert(
        &mut self,
        descriptor: AssetDescriptor,
        asset: Asset,
        ref_count: usize,
        dependencies: Vec<AssetDescriptor>,
        loader: Arc<dyn Loader>,
    ) {
        let previous = self.entries.insert(
            descriptor,
            CacheEntry {
                asset,
                ref_count,
                dependencies,
                loader,
            },
        );
        debug_assert!(previous.is_none(), "descriptor cached twice");
    }

    /// Take one more reference on a cached asset.
    pub fn retain(&mut self, descriptor: &AssetDescriptor) -> Option<Asset> {
        let entry = self.entries.get_mut(descriptor)?;
        entry.ref_count += 1;
        Some(entry.asset.clone())
    }

    /// Drop one reference, evicting the entry at zero.
    pub fn release(&mut self, descriptor: &AssetDescriptor) -> Released {
        let Some(entry) = self.entries.get_mut(descriptor) else {
            return Released::Missing;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return Released::Retained(entry.ref_count);
        }
        match self.entries.remove(descriptor) {
            Some(entry) => Released::Evicted(entry),
            None => Released::Missing,
        }
    }

    /// Remove an entry regardless of its count.
    pub fn evict(&mut self, descriptor: &AssetDescriptor) -> Option<CacheEntry> {
        self.entries.remove(descriptor)
    }

    /// Every cached descriptor, dependents before their dependencies.
    pub fn disposal_order(&self) -> Vec<AssetDescriptor> {
        let mut dependents: HashMap<&AssetDescriptor, usize> =
            self.entries.keys().map(|d| (d, 0)).collect();
        for entry in self.entries.values() {
            for dep in &entry.dependencies {
                if let Some(count) = dependents.get_mut(dep) {
                    *count += 1;
                }
            }
        }

        let mut ready: Vec<&AssetDescriptor> = dependents
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(d, _)| *d)
            .collect();
        let mut order = Vec::with_capacity(self.entries.len());
        while let Some(desc) = ready.pop() {
            order.push(desc.clone());
            if let Some(entry) = self.entries.get(desc) {
                for dep in &entry.dependencies {
                    if let Some(count) = dependents.get_mut(dep) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(dep);
                        }
                    }
                }
            }
        }
        order
    }
}
