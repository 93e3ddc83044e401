//! Embedded HTML for the web UI: password setup, login, and the
//! xterm.js-backed terminal page.

const AUTH_STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: 'SF Mono', 'Monaco', 'Courier New', monospace;
            background: #1a1a1a;
            color: #c0c0c0;
            height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
        }
        .card {
            background: #0a0a0a;
            border: 1px solid #333;
            border-radius: 8px;
            padding: 40px;
            width: 400px;
        }
        h1 { color: #00ff00; font-size: 18px; margin-bottom: 8px; }
        .subtitle { color: #888; font-size: 13px; margin-bottom: 24px; }
        label { display: block; margin-bottom: 6px; font-size: 13px; color: #888; }
        input[type="password"] {
            width: 100%;
            padding: 10px;
            background: #1a1a1a;
            border: 1px solid #333;
            border-radius: 4px;
            color: #c0c0c0;
            font-family: inherit;
            font-size: 14px;
            margin-bottom: 16px;
        }
        input[type="password"]:focus { outline: none; border-color: #00ff00; }
        button {
            width: 100%;
            padding: 10px;
            background: #00ff00;
            color: #0a0a0a;
            border: none;
            border-radius: 4px;
            font-family: inherit;
            font-size: 14px;
            font-weight: bold;
            cursor: pointer;
        }
        button:hover { background: #00cc00; }
        .error { background: #3a1010; border: 1px solid #ff4444; color: #ff6666; padding: 10px; border-radius: 4px; margin-bottom: 16px; font-size: 13px; }
"#;

fn error_block(error: Option<&str>) -> String {
    match error {
        Some(msg) => format!(r#"<div class="error">{msg}</div>"#),
        None => String::new(),
    }
}

pub fn setup_page(error: Option<&str>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Setup - Remote Terminal</title>
    <style>{AUTH_STYLE}</style>
</head>
<body>
    <div class="card">
        <h1>Create Password</h1>
        <div class="subtitle">Set a password for Remote Terminal WebUI</div>
        {errors}
        <form method="POST" action="/setup-password">
            <label for="password">Password</label>
            <input type="password" id="password" name="password" required autofocus>
            <label for="confirm">Confirm Password</label>
            <input type="password" id="confirm" name="confirm" required>
            <button type="submit">Set Password</button>
        </form>
    </div>
</body>
</html>"#,
        errors = error_block(error),
    )
}

pub fn login_page(error: Option<&str>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Login - Remote Terminal</title>
    <style>{AUTH_STYLE}</style>
</head>
<body>
    <div class="card">
        <h1>Remote Terminal</h1>
        <div class="subtitle">Enter your password to continue</div>
        {errors}
        <form method="POST" action="/login">
            <label for="password">Password</label>
            <input type="password" id="password" name="password" required autofocus>
            <button type="submit">Login</button>
        </form>
    </div>
</body>
</html>"#,
        errors = error_block(error),
    )
}

/// Terminal page. The client buffers rapid keystrokes for ~10ms before
/// sending (control characters go out immediately) and syncs its size to
/// the backend PTY on connect and on every window resize, so full-screen
/// TUI programs get correct dimensions before any interaction.
pub const TERMINAL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Remote Terminal</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: 'SF Mono', 'Monaco', 'Courier New', monospace;
            background: #1a1a1a;
            color: #00ff00;
            height: 100vh;
            max-height: 100vh;
            display: flex;
            flex-direction: column;
            overflow: hidden;
        }
        header {
            background: #0a0a0a;
            padding: 15px 20px;
            border-bottom: 2px solid #00ff00;
        }
        h1 { font-size: 18px; letter-spacing: 2px; }
        .status { font-size: 12px; color: #888; margin-top: 5px; }
        .status.connected { color: #00ff00; }
        .status.disconnected { color: #ff0000; }
        main { flex: 1; display: flex; flex-direction: column; overflow: hidden; }
        #terminal {
            flex: 1;
            overflow: hidden;
            padding: 10px;
            background: #0a0a0a;
            cursor: text;
        }
        ::-webkit-scrollbar { width: 10px; }
        ::-webkit-scrollbar-track { background: #0a0a0a; }
        ::-webkit-scrollbar-thumb { background: #333; }
        ::-webkit-scrollbar-thumb:hover { background: #00ff00; }
    </style>
</head>
<body>
    <header>
        <h1>REMOTE TERMINAL</h1>
        <div class="status" id="status">Connecting...</div>
    </header>

    <main>
        <div id="terminal"></div>
    </main>

    <script>
        let ws = null;
        let chatId = null;
        let term = null;
        let fitAddon = null;
        const statusEl = document.getElementById('status');

        function initTerminal() {
            term = new Terminal({
                cursorBlink: true,
                cursorStyle: 'block',
                fontSize: 14,
                fontFamily: "'SF Mono', 'Monaco', 'Courier New', monospace",
                theme: {
                    background: '#0a0a0a',
                    foreground: '#00ff00',
                    cursor: '#00ff00',
                    cursorAccent: '#1a1a1a',
                    selection: 'rgba(0, 255, 0, 0.3)'
                },
                rows: 50,
                cols: 120,
                scrollback: 10000,
                allowProposedApi: true,
                macOptionIsMeta: true,
                altClickMovesCursor: false
            });

            fitAddon = new FitAddon.FitAddon();
            term.loadAddon(fitAddon);
            term.open(document.getElementById('terminal'));
            fitAddon.fit();

            window.addEventListener('resize', () => {
                if (fitAddon) {
                    fitAddon.fit();
                    if (ws && ws.readyState === WebSocket.OPEN) {
                        ws.send(JSON.stringify({
                            type: 'resize',
                            rows: term.rows,
                            cols: term.cols
                        }));
                    }
                }
            });

            // No welcome banner: TUI apps rely on absolute cursor
            // positioning against a clean screen

            let inputBuffer = '';
            let inputTimer = null;

            term.onData((data) => {
                if (ws && ws.readyState === WebSocket.OPEN) {
                    inputBuffer += data;
                    if (inputTimer) {
                        clearTimeout(inputTimer);
                    }
                    const sendImmediately = data === '\r' || data === '\n' || data.charCodeAt(0) < 32;
                    if (sendImmediately) {
                        ws.send(JSON.stringify({ type: 'input', content: inputBuffer }));
                        inputBuffer = '';
                    } else {
                        inputTimer = setTimeout(() => {
                            if (inputBuffer) {
                                ws.send(JSON.stringify({ type: 'input', content: inputBuffer }));
                                inputBuffer = '';
                            }
                        }, 10);
                    }
                }
            });

            document.getElementById('terminal').addEventListener('click', () => {
                term.focus();
            });
            term.focus();
        }

        function connect() {
            const wsUrl = 'ws://' + window.location.host + '/ws';
            ws = new WebSocket(wsUrl);

            ws.onopen = () => {
                statusEl.textContent = '✅ Connected';
                statusEl.className = 'status connected';
                if (term && fitAddon) {
                    fitAddon.fit();
                    ws.send(JSON.stringify({
                        type: 'resize',
                        rows: term.rows,
                        cols: term.cols
                    }));
                }
            };

            ws.onclose = () => {
                statusEl.textContent = '❌ Disconnected - Refresh to reconnect';
                statusEl.className = 'status disconnected';
                if (term) {
                    term.writeln('\r\n\x1b[31m❌ WebSocket disconnected - Refresh page\x1b[0m\r\n');
                }
            };

            ws.onerror = (error) => {
                console.error('WebSocket error:', error);
                if (term) {
                    term.writeln('\r\n\x1b[31m❌ WebSocket error\x1b[0m\r\n');
                }
            };

            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                if (msg.chatId && !chatId) {
                    chatId = msg.chatId;
                }
                if (msg.type === 'output') {
                    term.write(msg.content);
                } else if (msg.type === 'status') {
                    term.writeln('\r\n\x1b[33m' + msg.content + '\x1b[0m\r\n');
                } else if (msg.type === 'error') {
                    term.writeln('\r\n\x1b[31m' + msg.content + '\x1b[0m\r\n');
                }
            };
        }

        initTerminal();
        connect();
    </script>
</body>
</html>
"#;
