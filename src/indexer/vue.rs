use crate::error::Result;
use crate::indexer::extract::{FileContext, LanguageExtractor, ParsedFile};
use crate::indexer::javascript;
use crate::model::{Span, SymbolId, SymbolKind, SymbolRecord};
use crate::util;
use tree_sitter::Parser;

/// Single-file components: the `<script>` block is parsed as TypeScript
/// (which also accepts plain JavaScript), plus one `component` symbol named
/// after the file.
pub struct VueExtractor {
    parser: Parser,
}

impl VueExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: crate::indexer::extract::new_parser(
                &tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            )?,
        })
    }
}

impl LanguageExtractor for VueExtractor {
    fn extract(&mut self, ctx: &FileContext<'_>, source: &str) -> Result<ParsedFile> {
        let component_name = util::file_stem(ctx.rel_path);
        let component_id = SymbolId::new(
            ctx.project,
            ctx.rel_path,
            SymbolKind::Component,
            component_name.clone(),
        );
        let line_count = source.lines().count().max(1) as u32;

        let mut output = match script_block(source) {
            Some(block) => {
                let mut parsed =
                    javascript::extract_script(&mut self.parser, ctx, block.text)?;
                parsed.shift_lines(block.line_offset);
                // The script's synthetic module symbol would shadow the
                // component; fold its references into the component instead.
                let mut component_refs = Vec::new();
                parsed.symbols.retain(|symbol| {
                    if symbol.kind == SymbolKind::Module {
                        component_refs = symbol.refs_out.clone();
                        false
                    } else {
                        true
                    }
                });
                parsed
                    .bodies
                    .retain(|(id, _)| id.kind != SymbolKind::Module);
                for call in &mut parsed.calls {
                    if call
                        .containing_symbol
                        .as_ref()
                        .map(|id| id.kind == SymbolKind::Module)
                        .unwrap_or(false)
                    {
                        call.containing_symbol = Some(component_id.clone());
                    }
                }
                parsed.symbols.insert(
                    0,
                    SymbolRecord {
                        id: component_id.clone(),
                        kind: SymbolKind::Component,
                        span: Span::new(1, line_count),
                        signature: None,
                        doc: None,
                        decorators: Vec::new(),
                        exports: true,
                        refs_out: component_refs,
                        extends: Vec::new(),
                        body_hash: util::body_hash(source),
                        ref_count: 0,
                    },
                );
                parsed
            }
            None => {
                let mut parsed = ParsedFile::default();
                parsed.symbols.push(SymbolRecord {
                    id: component_id.clone(),
                    kind: SymbolKind::Component,
                    span: Span::new(1, line_count),
                    signature: None,
                    doc: None,
                    decorators: Vec::new(),
                    exports: true,
                    refs_out: Vec::new(),
                    extends: Vec::new(),
                    body_hash: util::body_hash(source),
                    ref_count: 0,
                });
                parsed
            }
        };
        output.bodies.push((component_id, source.to_string()));
        Ok(output)
    }
}

struct ScriptBlock<'a> {
    text: &'a str,
    line_offset: u32,
}

/// Locate the first `<script ...>...</script>` block without regexes; the
/// tag scan is byte-oriented so template markup never confuses it.
fn script_block(source: &str) -> Option<ScriptBlock<'_>> {
    let open = source.find("<script")?;
    let open_end = source[open..].find('>')? + open + 1;
    let close = source[open_end..].find("</script>")? + open_end;
    let text = &source[open_end..close];
    let line_offset = source[..open_end].matches('\n').count() as u32;
    Some(ScriptBlock { text, line_offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_block_slices_and_offsets() {
        let sfc = "<template>\n  <div/>\n</template>\n<script setup lang=\"ts\">\nconst x = 1\n</script>\n";
        let block = script_block(sfc).unwrap();
        assert!(block.text.contains("const x = 1"));
        assert_eq!(block.line_offset, 3);
    }

    #[test]
    fn missing_script_block_is_none() {
        assert!(script_block("<template><div/></template>").is_none());
    }
}
