//! Sample roteiro documents for testing and demonstration.
//!
//! They follow the markup the print stylesheet targets: a centred header, a
//! details block, and a three-column script table with scene dividers.

/// 1×1 RGBA PNG used as the header logo.
pub const LOGO_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Marker text inside an element the print stylesheet must suppress.
pub const HIDDEN_MARKER: &str = "EDITOR-ONLY-NOTE";

/// A complete one-page roteiro with header, details, and script table.
pub fn roteiro_template() -> String {
    roteiro_with_rows("Jornal da Manhã", &sample_rows())
}

/// A roteiro long enough to span several pages.
pub fn long_roteiro_template(scenes: usize) -> String {
    let mut rows = Vec::new();
    for scene in 1..=scenes {
        rows.push(Row::Divider);
        rows.push(Row::Script {
            video: format!("CENA {scene}\nPlano geral da redação"),
            tec: "CORTE SECO".to_string(),
            audio: format!(
                "Locutor apresenta a matéria número {scene} com texto longo o bastante \
                 para ocupar várias linhas dentro da coluna de áudio do roteiro."
            ),
        });
    }
    roteiro_with_rows("Especial de Fim de Ano", &rows)
}

/// A roteiro whose single audio cell holds `words` words, far more than
/// one page can show.
pub fn long_audio_template(words: usize) -> String {
    let audio = (1..=words)
        .map(|i| format!("fala{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let rows = [
        Row::Divider,
        Row::Script {
            video: "Entrevista completa".to_string(),
            tec: "CORTE".to_string(),
            audio,
        },
        Row::Script {
            video: "Encerramento".to_string(),
            tec: "FADE OUT".to_string(),
            audio: "Até amanhã.".to_string(),
        },
    ];
    roteiro_with_rows("Entrevista", &rows)
}

/// The smallest document the CLI is expected to convert.
pub fn minimal_template() -> &'static str {
    "<html><body><p>Hello</p></body></html>"
}

/// A document that carries its own print rules and inline styles.
pub fn styled_template() -> &'static str {
    r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Roteiro: Estilos</title>
    <style>
        .aviso { color: #b00020; font-weight: bold; }
        @media screen { .aviso { display: none; } }
        @media print { .rodape { text-align: right; } }
    </style>
</head>
<body>
    <p class="aviso">Revisar antes de gravar</p>
    <ul>
        <li>Abertura</li>
        <li>Entrevista</li>
    </ul>
    <p class="rodape" style="font-style: italic">Produção &amp; Edição</p>
</body>
</html>
"##
}

enum Row {
    Divider,
    Script {
        video: String,
        tec: String,
        audio: String,
    },
}

fn sample_rows() -> Vec<Row> {
    vec![
        Row::Divider,
        Row::Script {
            video: "Abertura\nVinheta animada".to_string(),
            tec: "FADE IN".to_string(),
            audio: "Trilha sobe e desce para BG".to_string(),
        },
        Row::Script {
            video: "Apresentadora no estúdio".to_string(),
            tec: "CORTE".to_string(),
            audio: "Bom dia! Estas são as principais notícias de hoje.".to_string(),
        },
        Row::Divider,
        Row::Script {
            video: "VT reportagem".to_string(),
            tec: "DISSOLVE".to_string(),
            audio: "OFF repórter\nSonora entrevistado".to_string(),
        },
    ]
}

fn cell(text: &str) -> String {
    escape(text).replace('\n', "<br>")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn roteiro_with_rows(title: &str, rows: &[Row]) -> String {
    let title = escape(title);
    let mut html = format!(
        r##"<html><head><meta charset="UTF-8"><title>Roteiro: {title}</title></head><body>
<div class="roteiro-header">
    <img src="{LOGO_DATA_URI}" alt="Logo">
    <h1>{title}</h1>
</div>
<div class="roteiro-details">
    <p><strong>Data de Criação do Documento:</strong> 16/10/2026</p>
    <p><strong>Tipo:</strong> Jornal</p>
    <p><strong>Ano:</strong> 2026</p>
    <p><strong>Mês:</strong> Outubro</p>
</div>
<p data-print-hide="true">{HIDDEN_MARKER}</p>
<table>
<thead><tr><th>VÍDEO</th><th>TEC / TRANSIÇÃO</th><th>ÁUDIO</th></tr></thead>
<tbody>
"##
    );
    for row in rows {
        match row {
            Row::Divider => {
                html.push_str(r#"<tr class="divisoria-row"><td colspan="3">NOVA CENA</td></tr>"#);
            }
            Row::Script { video, tec, audio } => {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    cell(video),
                    cell(tec),
                    cell(audio)
                ));
            }
        }
        html.push('\n');
    }
    html.push_str("</tbody></table></body></html>\n");
    html
}
