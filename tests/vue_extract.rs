use flyto_index::indexer::extract::{FileContext, LanguageExtractor, ParsedFile};
use flyto_index::indexer::vue::VueExtractor;
use flyto_index::model::SymbolKind;

fn extract(rel_path: &str, source: &str) -> ParsedFile {
    let mut extractor = VueExtractor::new().unwrap();
    let ctx = FileContext {
        project: "web",
        rel_path,
    };
    extractor.extract(&ctx, source).unwrap()
}

const TOP_UP: &str = r#"<template>
  <button @click="submit">Top up</button>
</template>
<script setup lang="ts">
import { useWallet } from "@/composables/useWallet"

const props = defineProps<{ amount: number }>()
const emit = defineEmits(["done"])

const wallet = useWallet()

async function submit() {
  await wallet.topUp(props.amount)
  const res = await fetch("/api/wallet/balance")
  emit("done", await res.json())
}
</script>
"#;

#[test]
fn component_symbol_is_named_after_the_file() {
    let parsed = extract("src/pages/TopUp.vue", TOP_UP);
    let component = parsed
        .symbols
        .iter()
        .find(|s| s.kind == SymbolKind::Component)
        .unwrap();
    assert_eq!(component.id.name, "TopUp");
    assert!(component.exports);
    // The script module's loose references land on the component.
    assert!(component.refs_out.contains(&"useWallet".to_string()));
    assert!(component.refs_out.contains(&"defineProps".to_string()));
    assert!(component.refs_out.contains(&"defineEmits".to_string()));
}

#[test]
fn script_symbols_keep_file_relative_lines() {
    let parsed = extract("src/pages/TopUp.vue", TOP_UP);
    let submit = parsed
        .symbols
        .iter()
        .find(|s| s.id.name == "submit")
        .unwrap();
    // `async function submit` sits on line 12 of the SFC, not of the
    // script block.
    assert_eq!(submit.span.start_line, 12);
}

#[test]
fn script_imports_and_calls_are_extracted() {
    let parsed = extract("src/pages/TopUp.vue", TOP_UP);
    assert!(parsed
        .imports
        .iter()
        .any(|i| i.module == "@/composables/useWallet"));
    let call = parsed
        .calls
        .iter()
        .find(|c| c.url_literal == "/api/wallet/balance")
        .unwrap();
    assert_eq!(call.method, "GET");
    assert_eq!(call.file, "src/pages/TopUp.vue");
}

#[test]
fn template_only_component_still_yields_a_symbol() {
    let parsed = extract("src/Badge.vue", "<template><span/></template>\n");
    assert_eq!(parsed.symbols.len(), 1);
    assert_eq!(parsed.symbols[0].kind, SymbolKind::Component);
    assert_eq!(parsed.symbols[0].id.name, "Badge");
}
