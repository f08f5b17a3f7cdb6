//! Catalog DDL. Statements are idempotent so `initialize` can run on every start.

pub(super) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS DBProperties (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ContentFoldersCatalog (
        id TEXT PRIMARY KEY,
        parent_id TEXT,
        folder_name TEXT NOT NULL CHECK(length(trim(folder_name)) > 0),
        folder_type TEXT NOT NULL DEFAULT 'default',
        description TEXT NOT NULL DEFAULT '',
        is_root INTEGER NOT NULL DEFAULT 0,
        extended_properties_json TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_folders_parent ON ContentFoldersCatalog(parent_id, folder_name)",
    "CREATE TABLE IF NOT EXISTS ContentItems (
        id TEXT PRIMARY KEY,
        folder_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        content_type TEXT NOT NULL DEFAULT '',
        tags_json TEXT NOT NULL DEFAULT '[]',
        pinned INTEGER NOT NULL DEFAULT 0,
        extended_properties_json TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE INDEX IF NOT EXISTS idx_content_folder ON ContentItems(folder_id)",
    "CREATE TABLE IF NOT EXISTS TagItems (
        id TEXT PRIMARY KEY,
        tag TEXT NOT NULL UNIQUE,
        is_pinned INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS PromptItems (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        prompt_template_text TEXT NOT NULL DEFAULT '',
        prompt_template_type TEXT NOT NULL DEFAULT '',
        extended_properties_json TEXT NOT NULL DEFAULT '{}',
        system INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS VectorDBItems (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        vector_db_type TEXT NOT NULL,
        vector_db_url TEXT NOT NULL,
        is_use_multi_vector_retriever INTEGER NOT NULL DEFAULT 0,
        doc_store_url TEXT,
        collection_name TEXT NOT NULL DEFAULT '',
        chunk_size INTEGER NOT NULL DEFAULT 4096,
        default_search_result_limit INTEGER NOT NULL DEFAULT 5,
        default_score_threshold REAL NOT NULL DEFAULT 0.0,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        is_system INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS autogen_llm_configs (
        name TEXT PRIMARY KEY,
        api_type TEXT NOT NULL,
        api_version TEXT,
        model TEXT NOT NULL,
        api_key TEXT NOT NULL DEFAULT '',
        base_url TEXT
    )",
    "CREATE TABLE IF NOT EXISTS autogen_tools (
        name TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT '',
        path TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS autogen_agents (
        name TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT '',
        system_message TEXT NOT NULL DEFAULT '',
        code_execution INTEGER NOT NULL DEFAULT 0,
        llm_config_name TEXT NOT NULL DEFAULT '',
        tool_names_json TEXT NOT NULL DEFAULT '[]',
        vector_db_items_json TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS autogen_group_chats (
        name TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT '',
        llm_config_name TEXT NOT NULL DEFAULT '',
        agent_names_json TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS AutoProcessItems (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        item_type TEXT NOT NULL DEFAULT '',
        action_type TEXT NOT NULL DEFAULT '',
        extended_properties_json TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS auto_process_rules (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        priority INTEGER NOT NULL DEFAULT 0,
        is_enabled INTEGER NOT NULL DEFAULT 1,
        target_folder_id TEXT,
        auto_process_item_id TEXT,
        destination_folder_id TEXT,
        conditions_json TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS SearchRules (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        search_text TEXT NOT NULL DEFAULT '',
        search_condition_json TEXT NOT NULL DEFAULT '{}'
    )",
];
