//! Static identifier tables used before anything is sent to a model.
//!
//! [`ObjectCatalog`] answers "is this phrase exactly a known item or entity"
//! and [`StructureTable`] maps spoken location names to locatable structures.

use std::collections::{BTreeMap, BTreeSet};

const ITEMS: &[&str] = &[
    // ores and ingots
    "diamond", "gold_ingot", "iron_ingot", "copper_ingot", "netherite_scrap", "netherite_ingot",
    "emerald", "lapis_lazuli", "redstone", "coal", "charcoal", "quartz", "amethyst_shard",
    "raw_copper", "raw_iron", "raw_gold",
    // storage blocks
    "diamond_block", "gold_block", "iron_block", "emerald_block", "redstone_block", "lapis_block",
    "coal_block", "quartz_block", "copper_block", "netherite_block",
    // building
    "cobblestone", "stone", "granite", "diorite", "andesite", "sandstone", "prismarine",
    "nether_bricks", "mossy_cobblestone", "deepslate", "cobbled_deepslate", "blackstone",
    "oak_log", "spruce_log", "birch_log", "jungle_log", "acacia_log", "dark_oak_log",
    "mangrove_log", "cherry_log", "oak_planks", "spruce_planks", "birch_planks", "jungle_planks",
    "acacia_planks", "dark_oak_planks", "cherry_planks", "grass_block", "dirt", "coarse_dirt",
    "podzol", "netherrack", "end_stone", "clay", "gravel", "sand", "red_sand", "snow_block", "ice",
    "glass", "glass_pane", "obsidian", "crying_obsidian", "glowstone", "sea_lantern", "bone_block",
    "white_wool", "red_wool", "blue_wool", "black_wool", "white_concrete", "gray_concrete",
    "bricks", "terracotta",
    // food
    "apple", "golden_apple", "enchanted_golden_apple", "bread", "carrot", "golden_carrot",
    "potato", "baked_potato", "cooked_beef", "cooked_porkchop", "cooked_chicken", "cooked_mutton",
    "cooked_cod", "cooked_salmon", "pumpkin_pie", "cake", "cookie", "melon_slice",
    "sweet_berries", "honey_bottle", "milk_bucket",
    // tools and weapons
    "diamond_sword", "diamond_pickaxe", "diamond_axe", "diamond_shovel", "diamond_hoe",
    "netherite_sword", "netherite_pickaxe", "netherite_axe", "netherite_shovel", "netherite_hoe",
    "iron_sword", "iron_pickaxe", "iron_axe", "iron_shovel", "iron_hoe", "golden_sword",
    "golden_pickaxe", "stone_sword", "stone_pickaxe", "stone_axe", "wooden_sword",
    "wooden_pickaxe", "wooden_axe", "bow", "crossbow", "arrow", "spectral_arrow", "trident",
    "shield", "totem_of_undying", "fishing_rod", "shears", "flint_and_steel",
    // armor
    "diamond_helmet", "diamond_chestplate", "diamond_leggings", "diamond_boots",
    "netherite_helmet", "netherite_chestplate", "netherite_leggings", "netherite_boots",
    "iron_helmet", "iron_chestplate", "iron_leggings", "iron_boots", "golden_helmet",
    "golden_chestplate", "golden_leggings", "golden_boots", "chainmail_helmet",
    "chainmail_chestplate", "chainmail_leggings", "chainmail_boots", "leather_helmet",
    "leather_chestplate", "leather_leggings", "leather_boots", "turtle_helmet", "elytra",
    // materials
    "stick", "string", "feather", "leather", "paper", "book", "enchanted_book", "slime_ball",
    "ender_pearl", "ender_eye", "shulker_shell", "shulker_box", "blaze_rod", "blaze_powder",
    "ghast_tear", "magma_cream", "nether_star", "nether_wart", "gunpowder", "bone", "bone_meal",
    "flint", "experience_bottle", "name_tag", "saddle", "lead",
    // utility
    "torch", "soul_torch", "lantern", "campfire", "bucket", "water_bucket", "lava_bucket",
    "compass", "clock", "map", "spyglass", "bed", "white_bed", "red_bed", "chest", "barrel",
    "crafting_table", "furnace", "blast_furnace", "smoker", "anvil", "enchanting_table",
    "bookshelf", "brewing_stand", "cauldron", "beacon", "conduit", "hopper", "dropper",
    "dispenser", "observer", "piston", "sticky_piston", "lever", "minecart", "rail",
    "powered_rail", "tnt", "firework_rocket", "armor_stand", "item_frame", "painting",
];

const ENTITIES: &[&str] = &[
    "zombie", "skeleton", "creeper", "spider", "cave_spider", "enderman", "witch", "slime",
    "husk", "stray", "drowned", "phantom", "blaze", "ghast", "magma_cube", "wither_skeleton",
    "piglin", "piglin_brute", "hoglin", "zoglin", "strider", "shulker", "guardian",
    "elder_guardian", "pillager", "vindicator", "evoker", "ravager", "vex", "silverfish",
    "pig", "cow", "sheep", "chicken", "rabbit", "horse", "donkey", "mule", "llama", "wolf", "cat",
    "ocelot", "parrot", "fox", "bee", "goat", "frog", "axolotl", "turtle", "dolphin", "panda",
    "polar_bear", "bat", "squid", "glow_squid", "villager", "wandering_trader", "iron_golem",
    "snow_golem", "allay", "sniffer", "camel", "armadillo", "breeze", "warden", "wither",
    "ender_dragon",
];

const STRUCTURES: &[(&str, &str)] = &[
    ("village", "village"),
    ("pillager outpost", "pillager_outpost"),
    ("outpost", "pillager_outpost"),
    ("mansion", "mansion"),
    ("woodland mansion", "mansion"),
    ("desert pyramid", "desert_pyramid"),
    ("desert temple", "desert_pyramid"),
    ("pyramid", "desert_pyramid"),
    ("jungle temple", "jungle_pyramid"),
    ("jungle pyramid", "jungle_pyramid"),
    ("swamp hut", "swamp_hut"),
    ("witch hut", "swamp_hut"),
    ("ocean monument", "monument"),
    ("monument", "monument"),
    ("stronghold", "stronghold"),
    ("fortress", "fortress"),
    ("nether fortress", "fortress"),
    ("bastion", "bastion_remnant"),
    ("end city", "end_city"),
    ("endcity", "end_city"),
    ("shipwreck", "shipwreck"),
    ("buried treasure", "buried_treasure"),
    ("ruined portal", "ruined_portal"),
    ("mineshaft", "mineshaft"),
    ("igloo", "igloo"),
    ("ocean ruin", "ocean_ruin_cold"),
    ("ancient city", "ancient_city"),
    ("trail ruins", "trail_ruins"),
];

/// Lowercases, strips a `minecraft:` namespace and folds spaces and dashes
/// into single underscores.
pub fn normalize_identifier(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let without_namespace = lowered.strip_prefix("minecraft:").unwrap_or(&lowered);

    let mut normalized = String::with_capacity(without_namespace.len());
    for ch in without_namespace.chars() {
        let mapped = if ch.is_whitespace() || ch == '-' { '_' } else { ch };
        if mapped == '_' && (normalized.is_empty() || normalized.ends_with('_')) {
            continue;
        }
        normalized.push(mapped);
    }
    normalized.trim_end_matches('_').to_string()
}

/// True when `value` has the shape of a namespaced-or-bare identifier.
pub fn is_identifier_shaped(value: &str) -> bool {
    let mut parts = value.splitn(2, ':');
    let valid = |part: &str| {
        !part.is_empty()
            && part.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
    };
    match (parts.next(), parts.next()) {
        (Some(name), None) => valid(name),
        (Some(namespace), Some(name)) => valid(namespace) && valid(name),
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct ObjectCatalog {
    identifiers: BTreeSet<String>,
}

impl Default for ObjectCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ObjectCatalog {
    pub fn standard() -> Self {
        Self::with_identifiers(ITEMS.iter().chain(ENTITIES.iter()).copied())
    }

    pub fn with_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identifiers = identifiers
            .into_iter()
            .map(|id| normalize_identifier(id.as_ref()))
            .filter(|id| !id.is_empty())
            .collect();
        Self { identifiers }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    /// Exact match after normalisation, retrying once with a plural suffix
    /// removed ("diamonds", "torches").
    pub fn lookup(&self, phrase: &str) -> Option<&str> {
        let normalized = normalize_identifier(phrase);
        if normalized.is_empty() {
            return None;
        }

        let mut candidates = vec![normalized.clone()];
        if let Some(stem) = normalized.strip_suffix("es") {
            candidates.push(stem.to_string());
        }
        if let Some(stem) = normalized.strip_suffix('s') {
            candidates.push(stem.to_string());
        }

        candidates
            .iter()
            .find_map(|candidate| self.identifiers.get(candidate.as_str()).map(String::as_str))
    }

    /// Prompt-sized sample of identifiers.
    pub fn sample(&self, limit: usize) -> Vec<&str> {
        self.identifiers.iter().take(limit).map(String::as_str).collect()
    }
}

#[derive(Clone, Debug)]
pub struct StructureTable {
    names: BTreeMap<String, String>,
}

impl Default for StructureTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl StructureTable {
    pub fn standard() -> Self {
        Self {
            names: STRUCTURES
                .iter()
                .map(|(name, id)| ((*name).to_string(), (*id).to_string()))
                .collect(),
        }
    }

    /// Maps a spoken destination ("the nearest village") to a structure id.
    pub fn lookup(&self, phrase: &str) -> Option<&str> {
        let mut cleaned = phrase.trim().to_ascii_lowercase().replace('_', " ");
        for filler in ["the ", "a ", "an ", "nearest ", "closest ", "nearby "] {
            while let Some(rest) = cleaned.strip_prefix(filler) {
                cleaned = rest.to_string();
            }
        }
        let cleaned = cleaned.trim_end_matches(" please").trim();

        self.names.get(cleaned).map(String::as_str)
    }
}
